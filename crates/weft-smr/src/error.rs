use weft_stream::StreamError;
use weft_types::LogAddress;

/// Errors produced by SMR replay and transaction operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SmrError {
    /// Retryable: fill the hole and resync.
    #[error("hole at {address} during replay; fill and resync")]
    Hole { address: LogAddress },

    /// Fatal for the engine: replay history below its start is gone and the
    /// state cannot be reconstructed.
    #[error("history trimmed at {address}; object state cannot be reconstructed")]
    HistoryTrimmed { address: LogAddress },

    #[error("sync target carries no position")]
    InvalidTarget,

    #[error("executing engine's object is not of the requested type")]
    ObjectType,

    #[error("local transactions cannot be proposed to the log")]
    LocalTxPropose,

    #[error("transaction has no buffered effects to propose")]
    EmptyTransaction,

    #[error("record codec failure: {0}")]
    Codec(String),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

pub type SmrResult<T> = Result<T, SmrError>;
