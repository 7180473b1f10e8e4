//! The Hourly Aggregator: tabular state for the current business hour, with
//! money-conservation invariants enforced at flush time and snapshot/revert
//! support for cancels and reprints.

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::plu::PluCatalog;

/// Half-open clock interval `[hour, hour+1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow(pub u32);

impl HourWindow {
    pub fn encode(&self) -> String {
        format!("{:02}.00-{:02}.00", self.0, self.0 + 1)
    }
}

/// One emitted row: the tabular summary for a single business hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyRow {
    pub hour: Option<HourWindow>,
    pub total_takings: Money,
    pub cash: Money,
    pub credit_cards: Money,
    pub plu: Vec<Money>,
    pub customer_count: u32,
    pub first_transaction: Option<String>,
    pub last_transaction: Option<String>,
    pub no_sale: u32,
}

impl HourlyRow {
    pub fn empty(catalog_len: usize) -> Self {
        HourlyRow {
            hour: None,
            total_takings: Money::ZERO,
            cash: Money::ZERO,
            credit_cards: Money::ZERO,
            plu: vec![Money::ZERO; catalog_len],
            customer_count: 0,
            first_transaction: None,
            last_transaction: None,
            no_sale: 0,
        }
    }

    /// Discard rule (§3): a row with zero takings *or* zero customers is
    /// quiescent and must never be flushed. Not the same test as "has
    /// nothing been recorded at all yet" -- see [`HourlyRow::is_fresh`].
    pub fn is_empty(&self) -> bool {
        self.total_takings.is_zero() || self.customer_count == 0
    }

    /// `true` only when *nothing at all* has been recorded -- both takings
    /// and customer count are untouched. Used to decide whether a Header
    /// is opening a brand new hour (so `FirstTransaction`/`HourWindow`
    /// should be seeded) rather than continuing one already in progress;
    /// unlike [`HourlyRow::is_empty`], this must not trip on a
    /// partially-applied, not-yet-committed transaction.
    pub fn is_fresh(&self) -> bool {
        self.total_takings.is_zero() && self.customer_count == 0
    }

    /// Applies the money-conservation fix: `TotalTakings` should equal
    /// `Cash + CreditCards`; reconciles the two, floors `Cash` at zero, and
    /// floors every PLU column at zero (a discount can otherwise drive a
    /// single PLU's running total negative).
    pub fn finalize_invariants(&mut self) {
        let derived = self.cash + self.credit_cards;
        if self.total_takings.abs_diff(derived) != Money::ZERO {
            if self.credit_cards.is_zero() {
                self.total_takings = self.cash;
            } else {
                self.credit_cards = self.total_takings - self.cash;
            }
        }
        if self.cash.is_negative() {
            self.cash = Money::ZERO;
        }
        for plu in &mut self.plu {
            if plu.is_negative() {
                *plu = Money::ZERO;
            }
        }
    }
}

/// Owns the current hour's row and the one-slot snapshot used to revert on
/// cancel/reprint. At most one in-flight transaction exists at a time, so a
/// single shadow row suffices.
pub struct Aggregator {
    catalog: PluCatalog,
    row: HourlyRow,
    snapshot: Option<HourlyRow>,
}

impl Aggregator {
    pub fn new(catalog: PluCatalog) -> Self {
        let row = HourlyRow::empty(catalog.len());
        Aggregator {
            catalog,
            row,
            snapshot: None,
        }
    }

    pub fn row(&self) -> &HourlyRow {
        &self.row
    }

    pub fn row_mut(&mut self) -> &mut HourlyRow {
        &mut self.row
    }

    pub fn catalog(&self) -> &PluCatalog {
        &self.catalog
    }

    pub fn current_hour(&self) -> Option<HourWindow> {
        self.row.hour
    }

    pub fn ensure_hour(&mut self, hour: u32) {
        if self.row.hour.is_none() {
            self.row.hour = Some(HourWindow(hour));
        }
    }

    /// Deep-copies the current row as the pre-transaction snapshot.
    pub fn snapshot(&mut self) {
        self.snapshot = Some(self.row.clone());
    }

    /// Reverts to the last snapshot (cancel/reprint) and decrements the
    /// customer count the aborted transaction had already contributed.
    pub fn revert(&mut self) {
        if let Some(snap) = self.snapshot.take() {
            self.row = snap;
        }
    }

    /// Discards the pending snapshot without reverting (used on commit and
    /// on taking a fresh snapshot at the next Header).
    pub fn discard_snapshot(&mut self) {
        self.snapshot = None;
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn increment_no_sale(&mut self) {
        self.row.no_sale += 1;
    }

    /// PLU column index for `name`, if cataloged.
    pub fn plu_index(&self, name: &str) -> Option<usize> {
        self.catalog.position(name)
    }

    /// Zeroes all monetary fields and counts, clears the hour tag. Does not
    /// touch the checkpoint file -- that's the caller's (Checkpointer's)
    /// responsibility.
    pub fn clear(&mut self) {
        self.row = HourlyRow::empty(self.catalog.len());
        self.snapshot = None;
    }

    /// Replaces the current row wholesale, e.g. when restoring from a
    /// checkpoint on startup.
    pub fn restore(&mut self, row: HourlyRow) {
        self.row = row;
    }
}
