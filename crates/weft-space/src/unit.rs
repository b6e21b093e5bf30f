use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use weft_types::{LogAddress, NodeId};

use crate::error::{SpaceError, SpaceResult};

/// Storage-node transport for one member of a replication chain.
///
/// Addresses here are unit-local (already mapped through the view's routing
/// function). Every operation carries the caller's epoch; a unit at a newer
/// epoch rejects the request with `StaleEpoch`, which the address space
/// resolves by refreshing its view. Implementations must enforce write-once:
/// a second write with identical bytes is an idempotent success, a second
/// write with different bytes is an `Overwrite`.
pub trait LogUnit: Send + Sync {
    /// Write a payload at a unit-local address.
    fn write(&self, epoch: u64, address: LogAddress, payload: &[u8]) -> SpaceResult<()>;

    /// Read the payload at a unit-local address.
    fn read(&self, epoch: u64, address: LogAddress) -> SpaceResult<Bytes>;

    /// Mark every address at or below the given one as reclaimable.
    fn trim(&self, epoch: u64, address: LogAddress) -> SpaceResult<()>;

    /// The highest unit-local address ever written, if any. Used to rebuild
    /// a crashed sequencer by probing the address space.
    fn highest_address(&self) -> SpaceResult<Option<LogAddress>>;

    /// Install a new epoch; requests carrying older epochs are rejected.
    fn set_epoch(&self, epoch: u64) -> SpaceResult<()>;

    /// Discard all state and install the given epoch.
    fn reset(&self, epoch: u64) -> SpaceResult<()>;

    /// Liveness probe.
    fn ping(&self) -> bool;
}

/// Maps chain-member labels from a view onto transport clients.
pub trait UnitResolver: Send + Sync {
    fn resolve(&self, node: &NodeId) -> SpaceResult<Arc<dyn LogUnit>>;
}

/// Fixed node-to-transport map for tests and embedding.
pub struct StaticResolver {
    units: HashMap<NodeId, Arc<dyn LogUnit>>,
}

impl StaticResolver {
    pub fn new(units: HashMap<NodeId, Arc<dyn LogUnit>>) -> Self {
        Self { units }
    }

    pub fn insert(&mut self, node: NodeId, unit: Arc<dyn LogUnit>) {
        self.units.insert(node, unit);
    }
}

impl FromIterator<(NodeId, Arc<dyn LogUnit>)> for StaticResolver {
    fn from_iter<I: IntoIterator<Item = (NodeId, Arc<dyn LogUnit>)>>(iter: I) -> Self {
        Self {
            units: iter.into_iter().collect(),
        }
    }
}

impl UnitResolver for StaticResolver {
    fn resolve(&self, node: &NodeId) -> SpaceResult<Arc<dyn LogUnit>> {
        self.units
            .get(node)
            .cloned()
            .ok_or_else(|| SpaceError::UnknownNode(node.clone()))
    }
}
