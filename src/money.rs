//! Fixed-point money type.
//!
//! Hourly totals are accumulated from hundreds of parsed line items over a
//! business day; doing that in `f64` drifts by the time a row is flushed.
//! `Money` stores minor units (pence) in an `i64`, the same fixed-point
//! convention used for ledger amounts elsewhere in this codebase, scaled down
//! from 8 decimal places to 2 since the source device never prints finer than
//! a penny.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// 1 unit of currency (e.g. one pound) = 100 minor units (pence).
pub const MONEY_SCALE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    pub fn into_minor(self) -> i64 {
        self.0
    }

    /// Parses a decimal literal such as `"2.50"` or `"999.99"`. Accepts an
    /// optional leading `-`. Returns `None` on malformed input rather than
    /// failing the whole chunk; callers decide whether that's fatal.
    pub fn parse(text: &str) -> Option<Money> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let (sign, text) = match text.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, text),
        };
        let mut parts = text.splitn(2, '.');
        let whole = parts.next()?;
        let frac = parts.next().unwrap_or("0");
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        // Pad/truncate the fractional part to exactly 2 digits.
        let frac_digits: String = frac.chars().take(2).collect();
        let frac_digits = format!("{:0<2}", frac_digits);
        let frac: i64 = frac_digits.parse().ok()?;
        Some(Money(sign * (whole * MONEY_SCALE + frac)))
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn abs_diff(&self, other: Money) -> Money {
        Money((self.0 - other.0).abs())
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Money {
    /// Renders with exactly two decimal places, per the output column schema.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.0 < 0;
        let abs = self.0.unsigned_abs();
        let whole = abs / MONEY_SCALE as u64;
        let frac = abs % MONEY_SCALE as u64;
        if negative {
            write!(f, "-{}.{:02}", whole, frac)
        } else {
            write!(f, "{}.{:02}", whole, frac)
        }
    }
}

impl serde::Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let minor = i64::deserialize(deserializer)?;
        Ok(Money(minor))
    }
}
