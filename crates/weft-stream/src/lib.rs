//! Per-identifier logical streams over Weft's single global order.
//!
//! A stream is a projection: appends pull a token from the sequencer and
//! write a tagged entry into the write-once address space; readers scan the
//! global order forward, skipping entries that belong to other streams, and
//! surface holes (allocated but unwritten addresses) instead of skipping
//! them, because a concurrent writer may still complete one.

pub mod error;
pub mod runtime;
pub mod stream;

pub use error::{StreamError, StreamResult};
pub use runtime::{LogRuntime, StreamFactory};
pub use stream::{LogStream, StreamEntry};
