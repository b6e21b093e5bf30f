//! Foundation types for Weft, a client-side core for a shared, distributed,
//! write-once log.
//!
//! This crate provides the types shared by every other Weft crate:
//!
//! - [`LogAddress`] — a slot in the global total order
//! - [`Timestamp`] — a log address with MIN/MAX/INVALID sentinels
//! - [`StreamId`] — UUID v7 identifier for a logical stream
//! - [`View`] — an immutable snapshot of cluster topology
//! - [`LogEntry`] — payload bytes plus the streams they belong to

pub mod address;
pub mod entry;
pub mod error;
pub mod stream;
pub mod view;

pub use address::{LogAddress, Timestamp};
pub use entry::LogEntry;
pub use error::TypeError;
pub use stream::StreamId;
pub use view::{NodeId, ReplicaGroup, Segment, View};
