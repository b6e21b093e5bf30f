use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tracing::{debug, warn};

use weft_types::LogAddress;

use crate::error::{SpaceError, SpaceResult};
use crate::topology::ViewProvider;
use crate::unit::UnitResolver;

/// Write-once storage over the global order.
///
/// Each address may be durably written at most one distinct value: a second
/// write with different bytes fails with `Overwrite`, a retried identical
/// write succeeds idempotently. `Overwrite` and `Trimmed` are terminal;
/// transport failures are resolved inside the implementation by view refresh
/// and retry.
pub trait AddressSpace: Send + Sync {
    fn write(&self, address: LogAddress, payload: &[u8]) -> SpaceResult<()>;
    fn read(&self, address: LogAddress) -> SpaceResult<Bytes>;

    /// Advisory: addresses at or below this one may be garbage-collected.
    fn trim(&self, address: LogAddress) -> SpaceResult<()>;
}

/// Chain-replicated write-once address space routed through the current view.
///
/// Routing: the address selects a replica group within segment 0 by
/// `address mod group_count`, and the group stores it under
/// `address / group_count`. Writes walk the chain head to tail, each member
/// accepting before the next is contacted; a write is acknowledged only when
/// the tail accepts. Reads go to the tail alone, which chain replication
/// guarantees reflects every acknowledged write.
pub struct WriteOnceAddressSpace {
    provider: Arc<dyn ViewProvider>,
    resolver: Arc<dyn UnitResolver>,
}

impl WriteOnceAddressSpace {
    pub fn new(provider: Arc<dyn ViewProvider>, resolver: Arc<dyn UnitResolver>) -> Self {
        Self { provider, resolver }
    }

    /// One pass of the write path under a single view snapshot.
    fn write_through_chain(&self, address: LogAddress, payload: &[u8]) -> SpaceResult<()> {
        let view = self.provider.view()?;
        let segment = view.routing_segment();
        let (group_index, mapped) = segment.route(address);
        for node in &segment.groups[group_index].chain {
            let unit = self.resolver.resolve(node)?;
            unit.write(view.epoch, mapped, payload)
                .map_err(|e| globalize(e, address))?;
        }
        Ok(())
    }

    /// One pass of the read path under a single view snapshot.
    fn read_from_tail(&self, address: LogAddress) -> SpaceResult<Bytes> {
        let view = self.provider.view()?;
        let segment = view.routing_segment();
        let (group_index, mapped) = segment.route(address);
        let tail = segment.groups[group_index]
            .tail()
            .expect("views reject empty chains");
        let unit = self.resolver.resolve(tail)?;
        unit.read(view.epoch, mapped).map_err(|e| globalize(e, address))
    }
}

/// Log units report errors against their unit-local addresses; callers of
/// the space reason in global ones. Rewrite before propagating.
fn globalize(e: SpaceError, address: LogAddress) -> SpaceError {
    match e {
        SpaceError::Overwrite { .. } => SpaceError::Overwrite { address },
        SpaceError::Trimmed { .. } => SpaceError::Trimmed { address },
        SpaceError::Unwritten { .. } => SpaceError::Unwritten { address },
        SpaceError::Network {
            retryable, reason, ..
        } => SpaceError::Network {
            address: Some(address),
            retryable,
            reason,
        },
        other => other,
    }
}

impl AddressSpace for WriteOnceAddressSpace {
    fn write(&self, address: LogAddress, payload: &[u8]) -> SpaceResult<()> {
        loop {
            let failure = match self.write_through_chain(address, payload) {
                Ok(()) => return Ok(()),
                Err(e) if e.triggers_refresh() => e,
                Err(e) => return Err(e),
            };

            warn!(%address, error = %failure, "write failed, requesting new view");
            self.provider.invalidate_and_wait(&failure)?;

            // A prior attempt may have committed on part of the chain before
            // the topology moved. Re-verify before blindly retrying: if the
            // tail already holds our bytes the write is durably complete.
            match self.read(address) {
                Ok(existing) if existing.as_ref() == payload => {
                    debug!(%address, "write verified complete after view refresh");
                    return Ok(());
                }
                Ok(_) => {
                    debug!(%address, "address holds other contents, retrying write");
                }
                Err(e) => {
                    debug!(%address, error = %e, "write unverified after refresh, retrying");
                }
            }
        }
    }

    fn read(&self, address: LogAddress) -> SpaceResult<Bytes> {
        loop {
            match self.read_from_tail(address) {
                Ok(payload) => return Ok(payload),
                Err(e) if e.triggers_refresh() => {
                    warn!(%address, error = %e, "read failed, requesting new view");
                    self.provider.invalidate_and_wait(&e)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn trim(&self, address: LogAddress) -> SpaceResult<()> {
        loop {
            let view = self.provider.view()?;
            let segment = view.routing_segment();
            let (group_index, mapped) = segment.route(address);
            let mut failure = None;
            for node in &segment.groups[group_index].chain {
                let unit = self.resolver.resolve(node)?;
                match unit.trim(view.epoch, mapped).map_err(|e| globalize(e, address)) {
                    Ok(()) => {}
                    Err(e) if e.triggers_refresh() => {
                        failure = Some(e);
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
            match failure {
                None => return Ok(()),
                Some(e) => {
                    warn!(%address, error = %e, "trim failed, requesting new view");
                    self.provider.invalidate_and_wait(&e)?;
                }
            }
        }
    }
}

/// Read-through payload cache over any address space.
///
/// The log is write-once, so cache entries are permanent and never
/// invalidated except by process restart. Successful writes populate the
/// cache so the common append-then-scan pattern never touches the network
/// twice for the same address.
pub struct CachedAddressSpace {
    inner: Arc<dyn AddressSpace>,
    cache: RwLock<HashMap<u64, Bytes>>,
}

impl CachedAddressSpace {
    pub fn new(inner: Arc<dyn AddressSpace>) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Number of memoized addresses.
    pub fn cached_len(&self) -> usize {
        self.cache.read().expect("lock poisoned").len()
    }
}

impl AddressSpace for CachedAddressSpace {
    fn write(&self, address: LogAddress, payload: &[u8]) -> SpaceResult<()> {
        self.inner.write(address, payload)?;
        self.cache
            .write()
            .expect("lock poisoned")
            .insert(address.as_u64(), Bytes::copy_from_slice(payload));
        Ok(())
    }

    fn read(&self, address: LogAddress) -> SpaceResult<Bytes> {
        if let Some(hit) = self
            .cache
            .read()
            .expect("lock poisoned")
            .get(&address.as_u64())
        {
            return Ok(hit.clone());
        }
        let payload = self.inner.read(address)?;
        self.cache
            .write()
            .expect("lock poisoned")
            .insert(address.as_u64(), payload.clone());
        Ok(payload)
    }

    fn trim(&self, address: LogAddress) -> SpaceResult<()> {
        self.inner.trim(address)
    }
}
