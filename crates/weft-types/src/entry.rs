use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::stream::StreamId;

/// One slot's worth of the shared log: opaque payload bytes plus the streams
/// the entry belongs to.
///
/// Exactly one entry occupies exactly one address forever. The global order
/// is multiplexed: scanners skip entries that do not tag their stream, and
/// payloads they cannot decode at all, without failing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub streams: Vec<StreamId>,
    pub payload: Vec<u8>,
}

impl LogEntry {
    /// An entry tagged for a single stream.
    pub fn new(stream: StreamId, payload: Vec<u8>) -> Self {
        Self {
            streams: vec![stream],
            payload,
        }
    }

    /// An entry tagged for several streams at once (the transaction commit
    /// path writes one of these, reachable by every participant).
    pub fn tagged(streams: Vec<StreamId>, payload: Vec<u8>) -> Self {
        Self { streams, payload }
    }

    /// The no-op entry written to fill a hole. It tags no stream, so every
    /// scanner advances past it.
    pub fn filler() -> Self {
        Self {
            streams: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Whether this entry belongs to the given stream.
    pub fn contains_stream(&self, stream: &StreamId) -> bool {
        self.streams.contains(stream)
    }

    pub fn encode(&self) -> Result<Vec<u8>, TypeError> {
        bincode::serialize(self).map_err(|e| TypeError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TypeError> {
        bincode::deserialize(bytes).map_err(|e| TypeError::Decode(e.to_string()))
    }
}
