//! Transaction-line subdispatch: TOTAL, CASH, CHANGE, CHEQUE/CARD, AMOUNT
//! (discount), or a bare PLU line.

use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::config::{Config, Dialect};
use crate::error::EngineError;
use crate::money::Money;
use crate::plu::title_case;

/// Whether this line committed the in-flight transaction, and which rule
/// committed it -- the event state machine needs to know which (it clears
/// the 520 "ignore headers" flag only on a `Change` commit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    None,
    Total,
    Change,
}

/// Parser-local state that outlives any single line but not a transaction:
/// the PLU a trailing discount line should apply to, and whether the most
/// recent tender line was a card payment (for the change-after-card
/// correction).
#[derive(Debug, Default)]
pub struct TransactionParser {
    current_plu: Option<String>,
    last_card_amount: Option<Money>,
}

impl TransactionParser {
    pub fn new() -> Self {
        TransactionParser::default()
    }

    pub fn reset(&mut self) {
        self.current_plu = None;
        self.last_card_amount = None;
    }

    /// Applies one transaction line to `agg`. A 520 polling chunk can carry
    /// several key/value fields concatenated on one line (e.g. an item
    /// followed immediately by its CASH tender); every field is applied in
    /// order. Returns the last commit signal produced, if any, for the
    /// caller's state machine to act on.
    pub fn apply(
        &mut self,
        line: &str,
        config: &Config,
        agg: &mut Aggregator,
    ) -> Result<Commit, EngineError> {
        let segments = split_segments(line, config.currency_symbol);
        if segments.is_empty() {
            return Err(EngineError::NotATransactionLine(line.to_string()));
        }

        let mut last_commit = Commit::None;
        for (key, value) in &segments {
            match self.apply_segment(key, value, line, config, agg) {
                Ok(commit) => last_commit = commit,
                Err(err) => info!(error = %err, segment = %key, "transaction segment rejected, dropping"),
            }
        }
        Ok(last_commit)
    }

    fn apply_segment(
        &mut self,
        key: &str,
        value: &str,
        line: &str,
        config: &Config,
        agg: &mut Aggregator,
    ) -> Result<Commit, EngineError> {
        let key_upper = key.trim();

        if key_upper.contains("TOTAL") {
            let value = parse_value(value, line)?;
            agg.row_mut().total_takings += value;
            let mut commit = Commit::None;
            if config.dialect == Dialect::D420 {
                agg.row_mut().customer_count += 1;
                commit = Commit::Total;
            }
            return Ok(commit);
        }

        if key_upper.contains("CASH") {
            let value = parse_value(value, line)?;
            agg.row_mut().cash += value;
            return Ok(Commit::None);
        }

        if key_upper.contains("CHANGE") {
            let value = parse_value(value, line)?;
            agg.row_mut().cash -= value;
            if let Some(card_amount) = self.last_card_amount.take() {
                // Cashier hit CARD by mistake; reverse it back into cash.
                agg.row_mut().cash += card_amount;
                agg.row_mut().credit_cards -= card_amount;
            }
            let mut commit = Commit::None;
            if config.dialect == Dialect::D520 {
                agg.row_mut().customer_count += 1;
                commit = Commit::Change;
            }
            return Ok(commit);
        }

        if key_upper.contains("CHEQUE") || key_upper.contains("CARD") {
            let value = parse_value(value, line)?;
            agg.row_mut().credit_cards += value;
            self.last_card_amount = Some(value);
            return Ok(Commit::None);
        }

        if key_upper.contains("AMOUNT") {
            let value = parse_value(value, line)?;
            if let Some(plu) = &self.current_plu {
                if let Some(idx) = agg.plu_index(plu) {
                    agg.row_mut().plu[idx] += value;
                }
            }
            return Ok(Commit::None);
        }

        // Otherwise: a PLU line item.
        let normalized = title_case(key_upper);
        let value = parse_value(value, line)?;
        if !agg.catalog().contains(&normalized) {
            warn!(plu = %normalized, "unknown PLU key, dropping line");
            return Err(EngineError::UnknownPlu(normalized));
        }
        if value.abs_diff(Money::ZERO) >= config.single_item_cap {
            warn!(plu = %normalized, price = %value, "item price at or above single-item cap, rejecting");
            if config.dialect == Dialect::D520 {
                // 520 totals are summed live from item lines; undo what this
                // line would otherwise have contributed.
                agg.row_mut().total_takings -= value;
                agg.row_mut().cash -= value;
            }
            return Err(EngineError::OverCap {
                price: value.to_string(),
                cap: config.single_item_cap.to_string(),
            });
        }

        let idx = agg
            .plu_index(&normalized)
            .expect("checked membership above");
        agg.row_mut().plu[idx] += value;
        self.current_plu = Some(normalized);
        if config.dialect == Dialect::D520 {
            agg.row_mut().total_takings += value;
        }
        info!(line, "applied PLU line");
        Ok(Commit::None)
    }
}

/// Splits a line into ordered `(key, value)` segments on the currency
/// symbol. A 520 polling chunk can carry several fields concatenated on one
/// line (`"Coffee  £2.00  CASH  £5.00"`); each `£`-delimited part after the
/// first contributes the value for the key that precedes it, and whatever
/// text follows the numeric run becomes the next key.
fn split_segments(line: &str, currency: char) -> Vec<(String, String)> {
    if !line.contains(currency) {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("AMOUNT") {
            return vec![("AMOUNT".to_string(), rest.trim().to_string())];
        }
        return Vec::new();
    }

    let parts: Vec<&str> = line.split(currency).collect();
    let mut segments = Vec::new();
    let mut key = parts[0].trim().to_string();
    for part in &parts[1..] {
        let part = part.trim_start();
        let value_end = part
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
            .unwrap_or(part.len());
        let (value, rest) = part.split_at(value_end);
        if key.is_empty() || value.is_empty() {
            key = rest.trim().to_string();
            continue;
        }
        segments.push((key, value.to_string()));
        key = rest.trim().to_string();
    }
    segments
}

fn parse_value(raw: &str, line: &str) -> Result<Money, EngineError> {
    Money::parse(raw.trim()).ok_or_else(|| EngineError::NotATransactionLine(line.to_string()))
}
