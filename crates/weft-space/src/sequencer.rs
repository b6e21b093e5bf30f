use std::sync::atomic::{AtomicU64, Ordering};

use weft_types::{LogAddress, View};

use crate::error::SpaceResult;
use crate::unit::UnitResolver;

/// Issues the global total order of addresses.
///
/// `next` hands out fresh, globally unique, strictly increasing addresses;
/// `current` is the exclusive upper bound readers may scan to without
/// blocking (the value the next `next` call would return).
pub trait Sequencer: Send + Sync {
    fn next(&self) -> SpaceResult<LogAddress>;
    fn current(&self) -> SpaceResult<LogAddress>;
}

/// Atomic in-process sequencer.
///
/// Keeps no durable state: a crashed instance is rebuilt by probing the
/// address space for the highest written address (see [`recover_tail`]).
pub struct LocalSequencer {
    counter: AtomicU64,
}

impl LocalSequencer {
    /// A sequencer for a fresh log, starting at address 0.
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// A sequencer resuming at the given next-to-issue address.
    pub fn resuming_at(next: LogAddress) -> Self {
        Self {
            counter: AtomicU64::new(next.as_u64()),
        }
    }
}

impl Default for LocalSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer for LocalSequencer {
    fn next(&self) -> SpaceResult<LogAddress> {
        Ok(LogAddress::new(self.counter.fetch_add(1, Ordering::SeqCst)))
    }

    fn current(&self) -> SpaceResult<LogAddress> {
        Ok(LogAddress::new(self.counter.load(Ordering::SeqCst)))
    }
}

/// Probe the address space for the next address a recovered sequencer
/// should issue: one past the highest globally written address.
///
/// Each group's tail is asked for its highest unit-local address, which is
/// mapped back to a global address through the routing function. Nodes that
/// cannot answer are skipped; recovery needs any quorum of answers the
/// caller considers sufficient, and a partially probed tail only risks
/// re-issuing addresses that then fail as overwrites.
pub fn recover_tail(resolver: &dyn UnitResolver, view: &View) -> SpaceResult<LogAddress> {
    let segment = view.routing_segment();
    let mut next = LogAddress::new(0);
    for (group_index, group) in segment.groups.iter().enumerate() {
        let Some(tail) = group.tail() else { continue };
        let unit = resolver.resolve(tail)?;
        if let Some(mapped) = unit.highest_address()? {
            let global = segment.unroute(group_index, mapped);
            next = next.max(global.next());
        }
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use weft_types::{NodeId, ReplicaGroup};

    use crate::memory::InMemoryLogUnit;
    use crate::unit::{LogUnit, StaticResolver};

    use super::*;

    #[test]
    fn issues_strictly_increasing_addresses() {
        let sequencer = LocalSequencer::new();
        assert_eq!(sequencer.current().unwrap(), LogAddress::new(0));
        assert_eq!(sequencer.next().unwrap(), LogAddress::new(0));
        assert_eq!(sequencer.next().unwrap(), LogAddress::new(1));
        assert_eq!(sequencer.current().unwrap(), LogAddress::new(2));
    }

    #[test]
    fn concurrent_callers_get_distinct_addresses() {
        let sequencer = Arc::new(LocalSequencer::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sequencer = Arc::clone(&sequencer);
                thread::spawn(move || {
                    (0..100)
                        .map(|_| sequencer.next().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let issued = handle.join().unwrap();
            // Each caller observes its own issues in increasing order.
            assert!(issued.windows(2).all(|w| w[0] < w[1]));
            for address in issued {
                assert!(seen.insert(address), "duplicate address issued");
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(sequencer.current().unwrap(), LogAddress::new(800));
    }

    #[test]
    fn recovery_probes_group_tails() {
        let unit_a = Arc::new(InMemoryLogUnit::new(0));
        let unit_b = Arc::new(InMemoryLogUnit::new(0));
        // Global addresses 0..=5 striped over two groups: group 0 stores
        // mapped 0..=2, group 1 stores mapped 0..=2.
        unit_a.write(0, LogAddress::new(2), b"4").unwrap();
        unit_b.write(0, LogAddress::new(2), b"5").unwrap();

        let resolver: StaticResolver = [
            (NodeId::from("a"), unit_a as Arc<dyn LogUnit>),
            (NodeId::from("b"), unit_b as Arc<dyn LogUnit>),
        ]
        .into_iter()
        .collect();
        let view = View::single_segment(
            0,
            vec![
                ReplicaGroup::new(vec![NodeId::from("a")]),
                ReplicaGroup::new(vec![NodeId::from("b")]),
            ],
        )
        .unwrap();

        // Highest global address written is 5 (group 1, mapped 2).
        assert_eq!(
            recover_tail(&resolver, &view).unwrap(),
            LogAddress::new(6)
        );
        let sequencer = LocalSequencer::resuming_at(LogAddress::new(6));
        assert_eq!(sequencer.next().unwrap(), LogAddress::new(6));
    }

    #[test]
    fn recovery_on_empty_log_starts_at_zero() {
        let unit = Arc::new(InMemoryLogUnit::new(0));
        let resolver: StaticResolver = [(NodeId::from("a"), unit as Arc<dyn LogUnit>)]
            .into_iter()
            .collect();
        let view =
            View::single_segment(0, vec![ReplicaGroup::new(vec![NodeId::from("a")])]).unwrap();
        assert_eq!(recover_tail(&resolver, &view).unwrap(), LogAddress::new(0));
    }
}
