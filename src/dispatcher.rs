//! Fixed ordered pattern table mapping a normalized chunk to an [`EventKind`].
//!
//! First match wins. Modeled as a `match` over precompiled `Regex` statics
//! rather than a runtime list of `(pattern, handler)` pairs -- the set of
//! patterns is fixed at compile time, so there is no need to pay for
//! indirection through a dynamic dispatch table.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Header420,
    Header520,
    Footer,
    Report,
    Cancel,
    Reprint,
    Refund,
    NoSale,
    Diagnostic,
    TransactionLine,
}

fn header_420_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,2}/\d{2}/\d{4}").unwrap())
}

/// Classifies one normalized chunk. First matching rule wins, in the order
/// laid out below.
pub fn classify(chunk: &str) -> EventKind {
    if header_420_re().is_match(chunk) {
        return EventKind::Header420;
    }
    if chunk.contains("REGISTER MODE") {
        return EventKind::Header520;
    }
    if chunk.starts_with("CLERK") {
        return EventKind::Footer;
    }
    if chunk.contains("REPORT") {
        return EventKind::Report;
    }
    if chunk.contains("CANCEL") {
        return EventKind::Cancel;
    }
    if chunk.contains("REPRINT") {
        return EventKind::Reprint;
    }
    if chunk.starts_with("PAID OUT") {
        return EventKind::Refund;
    }
    if chunk.contains("NOSALE") || chunk.contains("NS") {
        return EventKind::NoSale;
    }
    if chunk.contains('=') {
        return EventKind::Diagnostic;
    }
    EventKind::TransactionLine
}
