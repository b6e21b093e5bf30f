use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;

use weft_types::LogAddress;

use crate::error::{SpaceError, SpaceResult};
use crate::unit::LogUnit;

/// In-memory storage node for tests, local demos, and embedding.
///
/// Enforces the full unit contract: write-once (idempotent on identical
/// bytes), epoch rejection, and a trim watermark below which both reads and
/// writes fail with `Trimmed`.
pub struct InMemoryLogUnit {
    inner: RwLock<UnitState>,
}

struct UnitState {
    epoch: u64,
    slots: HashMap<u64, Bytes>,
    trim_mark: Option<u64>,
}

impl InMemoryLogUnit {
    pub fn new(epoch: u64) -> Self {
        Self {
            inner: RwLock::new(UnitState {
                epoch,
                slots: HashMap::new(),
                trim_mark: None,
            }),
        }
    }

    /// Number of written slots still held.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("lock poisoned").slots.is_empty()
    }

    fn check_epoch(state: &UnitState, requested: u64) -> SpaceResult<()> {
        if requested < state.epoch {
            return Err(SpaceError::StaleEpoch {
                requested,
                current: state.epoch,
            });
        }
        Ok(())
    }

    fn check_trim(state: &UnitState, address: LogAddress) -> SpaceResult<()> {
        if let Some(mark) = state.trim_mark {
            if address.as_u64() <= mark {
                return Err(SpaceError::Trimmed { address });
            }
        }
        Ok(())
    }
}

impl LogUnit for InMemoryLogUnit {
    fn write(&self, epoch: u64, address: LogAddress, payload: &[u8]) -> SpaceResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        Self::check_epoch(&state, epoch)?;
        Self::check_trim(&state, address)?;
        match state.slots.get(&address.as_u64()) {
            // Idempotent: a retried write of the same bytes already took.
            Some(existing) if existing.as_ref() == payload => Ok(()),
            Some(_) => Err(SpaceError::Overwrite { address }),
            None => {
                state
                    .slots
                    .insert(address.as_u64(), Bytes::copy_from_slice(payload));
                Ok(())
            }
        }
    }

    fn read(&self, epoch: u64, address: LogAddress) -> SpaceResult<Bytes> {
        let state = self.inner.read().expect("lock poisoned");
        Self::check_epoch(&state, epoch)?;
        Self::check_trim(&state, address)?;
        state
            .slots
            .get(&address.as_u64())
            .cloned()
            .ok_or(SpaceError::Unwritten { address })
    }

    fn trim(&self, epoch: u64, address: LogAddress) -> SpaceResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        Self::check_epoch(&state, epoch)?;
        let mark = match state.trim_mark {
            Some(existing) => existing.max(address.as_u64()),
            None => address.as_u64(),
        };
        state.trim_mark = Some(mark);
        state.slots.retain(|slot, _| *slot > mark);
        Ok(())
    }

    fn highest_address(&self) -> SpaceResult<Option<LogAddress>> {
        let state = self.inner.read().expect("lock poisoned");
        let highest = state.slots.keys().max().copied();
        // A fully trimmed unit still remembers how far the log reached.
        let mark = state.trim_mark;
        Ok(match (highest, mark) {
            (Some(h), Some(m)) => Some(LogAddress::new(h.max(m))),
            (Some(h), None) => Some(LogAddress::new(h)),
            (None, Some(m)) => Some(LogAddress::new(m)),
            (None, None) => None,
        })
    }

    fn set_epoch(&self, epoch: u64) -> SpaceResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        state.epoch = state.epoch.max(epoch);
        Ok(())
    }

    fn reset(&self, epoch: u64) -> SpaceResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        state.slots.clear();
        state.trim_mark = None;
        state.epoch = epoch;
        Ok(())
    }

    fn ping(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for InMemoryLogUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read().expect("lock poisoned");
        f.debug_struct("InMemoryLogUnit")
            .field("epoch", &state.epoch)
            .field("slots", &state.slots.len())
            .field("trim_mark", &state.trim_mark)
            .finish()
    }
}
