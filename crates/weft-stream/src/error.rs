use weft_space::SpaceError;
use weft_types::{LogAddress, TypeError};

/// Errors produced by stream operations.
///
/// The taxonomy distinguishes "retry with new input" (`Overwrite` from a
/// stale assumption), "data gone" (`Trimmed`), and "try again later"
/// (`HoleEncountered`, `Io` after internal retries were exhausted).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("log exhausted")]
    OutOfSpace,

    #[error("hole at address {address}: allocated but unwritten; fill before proceeding")]
    HoleEncountered { address: LogAddress },

    #[error("address {address} has been trimmed")]
    Trimmed { address: LogAddress },

    #[error("write-once violation at {address}: sequencer-issued address was already taken")]
    Overwrite { address: LogAddress },

    #[error("timestamp names no address: {0}")]
    InvalidTimestamp(String),

    #[error("entry codec failure: {0}")]
    Codec(String),

    #[error("log I/O failure: {0}")]
    Io(String),
}

impl From<SpaceError> for StreamError {
    fn from(e: SpaceError) -> Self {
        match e {
            SpaceError::Overwrite { address } => Self::Overwrite { address },
            SpaceError::Trimmed { address } => Self::Trimmed { address },
            SpaceError::Unwritten { address } => Self::HoleEncountered { address },
            // Transient transport errors only reach here once the space has
            // exhausted its internal refresh-and-retry.
            other => Self::Io(other.to_string()),
        }
    }
}

impl From<TypeError> for StreamError {
    fn from(e: TypeError) -> Self {
        Self::Codec(e.to_string())
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
