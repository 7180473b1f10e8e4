//! Per-chunk scrubbing and dialect-specific rewrites.
//!
//! Bit-exact rules since they govern interop with a physical device (see
//! device protocol quirks. Never fails: malformed chunks fall through and are
//! rejected downstream by the dispatcher/parser instead.

use std::collections::VecDeque;

use regex::Regex;
use std::sync::OnceLock;

use crate::config::Dialect;

fn quantity_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s[0-9]\s").unwrap())
}

fn numeric_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{1,2}\.\d\d").unwrap())
}

/// Scrubs and (for 520) splits chunks, carrying a one-slot pending buffer for
/// the synthetic `CHANGE` sub-chunk a 520 `CASH...CHANGE` line spawns for the
/// *next* read cycle (§5's ordering guarantee: drained before any newly read
/// chunk is processed).
pub struct Normalizer {
    dialect: Dialect,
    currency_symbol: char,
    pending: VecDeque<String>,
}

impl Normalizer {
    pub fn new(dialect: Dialect, currency_symbol: char) -> Self {
        Normalizer {
            dialect,
            currency_symbol,
            pending: VecDeque::new(),
        }
    }

    /// Feeds one raw chunk from the chunk source and returns the canonical
    /// chunks it (and any previously queued sub-chunk) produce, in order.
    pub fn normalize(&mut self, raw: &str) -> Vec<String> {
        let mut out: Vec<String> = self.pending.drain(..).collect();
        let scrubbed = self.scrub(raw);
        match self.dialect {
            Dialect::D420 => out.push(scrubbed),
            Dialect::D520 => out.extend(self.normalize_520(&scrubbed)),
        }
        out
    }

    fn scrub(&self, raw: &str) -> String {
        let mut s: String = raw
            .chars()
            .filter(|&c| c != '\u{0000}' && c != '\u{00C2}')
            .collect();
        s = s.replace('\u{009C}', &self.currency_symbol.to_string());
        s = s.replace('?', &self.currency_symbol.to_string());
        s
    }

    fn normalize_520(&mut self, chunk: &str) -> Vec<String> {
        let mut s = chunk.replace('@', "");
        s = quantity_marker_re().replace_all(&s, " ").to_string();
        s = self.prepend_currency_before_numbers(&s);

        if let Some(cash_idx) = s.find("CASH") {
            if let Some(change_idx) = s[cash_idx..].find("CHANGE") {
                let change_idx = cash_idx + change_idx;
                let cash_part = s[..change_idx].trim().to_string();
                let change_part = s[change_idx..].trim().to_string();
                self.pending.push_back(change_part);
                return vec![cash_part];
            }
        }
        vec![s]
    }

    fn prepend_currency_before_numbers(&self, s: &str) -> String {
        let sym = self.currency_symbol;
        let mut result = String::with_capacity(s.len() + 4);
        let mut last_end = 0;
        for m in numeric_literal_re().find_iter(s) {
            result.push_str(&s[last_end..m.start()]);
            let already_prefixed = s[..m.start()].ends_with(sym);
            if !already_prefixed {
                result.push(sym);
            }
            result.push_str(m.as_str());
            last_end = m.end();
        }
        result.push_str(&s[last_end..]);
        result
    }
}
