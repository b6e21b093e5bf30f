use weft_types::{LogAddress, NodeId};

/// Errors produced by address-space and storage-node operations.
///
/// `Overwrite` and `Trimmed` are terminal: retrying cannot change the
/// outcome. `StaleEpoch` and retryable `Network` failures are transient and
/// resolved inside the space by a view refresh; they only surface when no
/// refreshed topology can be obtained at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpaceError {
    #[error("address {address} already written with different contents")]
    Overwrite { address: LogAddress },

    #[error("address {address} has been trimmed")]
    Trimmed { address: LogAddress },

    #[error("address {address} is unwritten")]
    Unwritten { address: LogAddress },

    #[error("stale epoch: request carried {requested}, unit is at {current}")]
    StaleEpoch { requested: u64, current: u64 },

    #[error("network failure at {address:?} (retryable: {retryable}): {reason}")]
    Network {
        address: Option<LogAddress>,
        retryable: bool,
        reason: String,
    },

    #[error("no topology view available: {0}")]
    NoView(String),

    #[error("no transport for node {0}")]
    UnknownNode(NodeId),
}

impl SpaceError {
    /// Transient errors that a view refresh plus retry may resolve.
    /// Terminal outcomes (`Overwrite`, `Trimmed`, `Unwritten`) are not.
    pub fn triggers_refresh(&self) -> bool {
        matches!(
            self,
            Self::StaleEpoch { .. } | Self::Network { .. }
        )
    }
}

pub type SpaceResult<T> = Result<T, SpaceError>;
