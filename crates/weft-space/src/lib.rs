//! Write-once, chain-replicated address space for Weft.
//!
//! This crate is the routing core of the shared log. It provides:
//! - `LogUnit` / `UnitResolver` trait boundaries for storage-node transports
//! - `InMemoryLogUnit` implementation for tests and embedding
//! - `ViewProvider` with coalesced (single-flight) topology refresh
//! - `Sequencer` trait and the atomic `LocalSequencer`
//! - `WriteOnceAddressSpace`: chain routing, view-change retry, read-verify
//! - `CachedAddressSpace`: permanent read-through payload cache

pub mod error;
pub mod memory;
pub mod sequencer;
pub mod space;
pub mod topology;
pub mod unit;

pub use error::{SpaceError, SpaceResult};
pub use memory::InMemoryLogUnit;
pub use sequencer::{recover_tail, LocalSequencer, Sequencer};
pub use space::{AddressSpace, CachedAddressSpace, WriteOnceAddressSpace};
pub use topology::{RefreshingViewProvider, StaticViewProvider, ViewProvider, ViewSource};
pub use unit::{LogUnit, StaticResolver, UnitResolver};
