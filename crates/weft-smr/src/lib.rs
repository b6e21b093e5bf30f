//! State-machine replication and transactions over Weft streams.
//!
//! An [`SmrEngine`] derives an in-memory object's state solely by replaying
//! its stream in address order; replaying the same prefix always produces
//! the same state. A [`Transaction`] binds a command to a snapshot timestamp
//! and a set of participant streams, buffers its effects, and proposes them
//! as a single commit record reachable by every participant.

pub mod engine;
pub mod error;
pub mod records;
pub mod transaction;

pub use engine::{PassThroughEngine, SmrEngine, SmrObject};
pub use error::{SmrError, SmrResult};
pub use records::{CommitRecord, SmrRecord};
pub use transaction::{Transaction, TxBuffer, TxEngine};
