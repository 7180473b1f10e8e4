//! Typed errors for the data-quality and rollback paths the engine itself
//! reasons about. Startup-fatal conditions (catalog/site-map/chunk-source
//! acquisition) propagate as plain `anyhow::Error` with a `.context(...)`
//! chain at the call site instead -- they have no recovery path worth
//! naming a variant for.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown PLU key: {0}")]
    UnknownPlu(String),

    #[error("item price {price} at or above single-item cap {cap}")]
    OverCap { price: String, cap: String },

    #[error("malformed header chunk: {0}")]
    MalformedHeader(String),

    #[error("transaction line missing currency symbol and not a discount: {0}")]
    NotATransactionLine(String),
}
