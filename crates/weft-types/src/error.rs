use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("entry decode failed: {0}")]
    Decode(String),

    #[error("entry encode failed: {0}")]
    Encode(String),

    #[error("invalid view: {0}")]
    InvalidView(String),

    #[error("timestamp {0} carries no address")]
    NoAddress(String),
}
