use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use weft_types::{LogAddress, StreamId, Timestamp};

use crate::error::SmrError;

/// Wire form of what SMR engines write into stream entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmrRecord {
    /// One encoded object command proposed outside any transaction.
    Mutation(Vec<u8>),
    /// A transaction commit: the buffered write-sets of every participant,
    /// appended once and reachable by each of their streams.
    Commit(CommitRecord),
}

impl SmrRecord {
    pub fn encode(&self) -> Result<Vec<u8>, SmrError> {
        bincode::serialize(self).map_err(|e| SmrError::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SmrError> {
        bincode::deserialize(bytes).map_err(|e| SmrError::Codec(e.to_string()))
    }
}

/// A transaction's effect, re-derivable deterministically during replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// The snapshot the transaction executed against.
    pub snapshot: Timestamp,
    /// Encoded commands per participant stream, in execution order.
    pub writes: BTreeMap<StreamId, Vec<Vec<u8>>>,
}

impl CommitRecord {
    /// Optimistic concurrency is resolved here, at apply time, not at
    /// propose time: a commit is valid for a replaying stream only if it
    /// carries a write-set for that stream and executed against a snapshot
    /// strictly below its own position in the log.
    pub fn valid_at(&self, commit_address: LogAddress, stream: &StreamId) -> bool {
        if !self.writes.contains_key(stream) {
            return false;
        }
        match self.snapshot {
            Timestamp::Min => true,
            Timestamp::At(snapshot) => snapshot < commit_address,
            Timestamp::Max | Timestamp::Invalid => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrip() {
        let stream = StreamId::new();
        let record = SmrRecord::Commit(CommitRecord {
            snapshot: Timestamp::at(3),
            writes: [(stream, vec![b"cmd".to_vec()])].into_iter().collect(),
        });
        let bytes = record.encode().unwrap();
        assert_eq!(SmrRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn commit_validity() {
        let member = StreamId::new();
        let outsider = StreamId::new();
        let record = CommitRecord {
            snapshot: Timestamp::at(5),
            writes: [(member, vec![b"cmd".to_vec()])].into_iter().collect(),
        };
        assert!(record.valid_at(LogAddress::new(6), &member));
        // Snapshot at or past the commit's own address is malformed.
        assert!(!record.valid_at(LogAddress::new(5), &member));
        assert!(!record.valid_at(LogAddress::new(4), &member));
        // Streams without a write-set never apply it.
        assert!(!record.valid_at(LogAddress::new(6), &outsider));

        let fresh = CommitRecord {
            snapshot: Timestamp::Min,
            writes: record.writes.clone(),
        };
        assert!(fresh.valid_at(LogAddress::new(0), &member));

        let broken = CommitRecord {
            snapshot: Timestamp::Invalid,
            writes: record.writes.clone(),
        };
        assert!(!broken.valid_at(LogAddress::new(9), &member));
    }
}
