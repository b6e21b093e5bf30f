use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::LogAddress;
use crate::error::TypeError;

/// Opaque endpoint label for a storage node, resolved to a transport client
/// by the routing layer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(label: &str) -> Self {
        Self(label.to_string())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered replication chain for a subset of addresses.
///
/// Chain order is significant: writes flow head to tail, each member
/// accepting before the next is contacted, and reads are served by the tail,
/// which reflects every acknowledged write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaGroup {
    pub chain: Vec<NodeId>,
}

impl ReplicaGroup {
    pub fn new(chain: Vec<NodeId>) -> Self {
        Self { chain }
    }

    /// The tail member, which serves reads. Empty chains are rejected at
    /// view construction.
    pub fn tail(&self) -> Option<&NodeId> {
        self.chain.last()
    }
}

/// A contiguous portion of the global address range, striped across
/// replica groups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub groups: Vec<ReplicaGroup>,
}

impl Segment {
    pub fn new(groups: Vec<ReplicaGroup>) -> Self {
        Self { groups }
    }

    /// Route a global address within this segment: the group is selected by
    /// `address mod group_count` and the address the group stores it under
    /// is `address / group_count`.
    pub fn route(&self, address: LogAddress) -> (usize, LogAddress) {
        let count = self.groups.len() as u64;
        let raw = address.as_u64();
        ((raw % count) as usize, LogAddress::new(raw / count))
    }

    /// Inverse of [`route`](Self::route): the global address a unit-local
    /// address in the given group corresponds to.
    pub fn unroute(&self, group_index: usize, mapped: LogAddress) -> LogAddress {
        let count = self.groups.len() as u64;
        LogAddress::new(mapped.as_u64() * count + group_index as u64)
    }
}

/// An immutable snapshot of cluster topology.
///
/// A new epoch produces a wholly new `View`; views are never mutated in
/// place, so concurrent readers can hold one without observing a torn
/// topology. The current design carries a single segment covering the full
/// address range; the list shape is the extension point for range splits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub epoch: u64,
    pub segments: Vec<Segment>,
}

impl View {
    /// Build a view, rejecting structurally unusable topologies: no
    /// segments, a segment with no groups, or a group with an empty chain.
    pub fn new(epoch: u64, segments: Vec<Segment>) -> Result<Self, TypeError> {
        if segments.is_empty() {
            return Err(TypeError::InvalidView("view has no segments".into()));
        }
        for segment in &segments {
            if segment.groups.is_empty() {
                return Err(TypeError::InvalidView("segment has no groups".into()));
            }
            if segment.groups.iter().any(|g| g.chain.is_empty()) {
                return Err(TypeError::InvalidView("group has an empty chain".into()));
            }
        }
        Ok(Self { epoch, segments })
    }

    /// Convenience constructor for the common single-segment topology.
    pub fn single_segment(epoch: u64, groups: Vec<ReplicaGroup>) -> Result<Self, TypeError> {
        Self::new(epoch, vec![Segment::new(groups)])
    }

    /// The segment addresses are routed through. Multi-segment routing is a
    /// future extension; every address currently resolves through segment 0.
    pub fn routing_segment(&self) -> &Segment {
        &self.segments[0]
    }
}
