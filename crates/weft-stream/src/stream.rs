use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use weft_space::{AddressSpace, Sequencer};
use weft_types::{LogAddress, LogEntry, StreamId, Timestamp};

use crate::error::{StreamError, StreamResult};

/// An entry returned from a stream read, stamped with the global address it
/// occupies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEntry {
    pub timestamp: Timestamp,
    pub entry: LogEntry,
}

impl StreamEntry {
    pub fn payload(&self) -> &[u8] {
        &self.entry.payload
    }
}

/// A handle onto one logical stream within the shared log.
///
/// The cursor (the next global address not yet scanned) is the only mutable
/// per-stream state. It advances monotonically; concurrent `read_next` calls
/// on one handle are serialized against it, while appends are independent —
/// sequencer-issued addresses are disjoint by construction.
pub struct LogStream {
    id: StreamId,
    sequencer: Arc<dyn Sequencer>,
    space: Arc<dyn AddressSpace>,
    cursor: Mutex<u64>,
    last_check: Mutex<Timestamp>,
}

impl LogStream {
    /// Open a stream handle at the start of the log. Re-opening the same
    /// identifier yields an independent handle with its own cursor.
    pub fn open(
        id: StreamId,
        sequencer: Arc<dyn Sequencer>,
        space: Arc<dyn AddressSpace>,
    ) -> Self {
        Self {
            id,
            sequencer,
            space,
            cursor: Mutex::new(0),
            last_check: Mutex::new(Timestamp::Invalid),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Append a payload to this stream.
    ///
    /// Obtains a fresh address from the sequencer, tags an entry with this
    /// stream's identifier, and writes it through the address space. The
    /// address is unique by construction, so `Overwrite` here is a protocol
    /// violation and is surfaced, never retried: retrying at the same
    /// address is meaningless for a write-once log, and moving to a new
    /// address is the caller's decision.
    pub fn append(&self, payload: Vec<u8>) -> StreamResult<Timestamp> {
        let address = self.sequencer.next()?;
        let entry = LogEntry::new(self.id, payload);
        let bytes = entry.encode()?;
        self.space.write(address, &bytes)?;
        trace!(stream = %self.id.short_id(), %address, "appended entry");
        Ok(Timestamp::At(address))
    }

    /// Return the next entry belonging to this stream, or `None` if the
    /// scan reaches the sequencer's current bound without one.
    ///
    /// Never waits for new data. Entries tagged for other streams, and
    /// payloads this log's consumer does not recognize (the global order is
    /// multiplexed), are skipped with the cursor advancing past them. An
    /// unwritten address stops the scan with `HoleEncountered`, cursor kept
    /// at the hole: a concurrent writer may still complete it, so it must be
    /// filled before progress resumes.
    pub fn read_next(&self) -> StreamResult<Option<StreamEntry>> {
        let bound = self.sequencer.current()?.as_u64();
        self.scan_to(bound)
    }

    /// Like [`read_next`](Self::read_next), but never scans past `limit`
    /// (inclusive). The cursor stays put on addresses beyond the limit, so a
    /// later unbounded read still delivers them.
    pub fn read_next_up_to(&self, limit: LogAddress) -> StreamResult<Option<StreamEntry>> {
        let issued = self.sequencer.current()?.as_u64();
        self.scan_to(issued.min(limit.as_u64().saturating_add(1)))
    }

    fn scan_to(&self, bound: u64) -> StreamResult<Option<StreamEntry>> {
        let mut cursor = self.cursor.lock().expect("lock poisoned");
        while *cursor < bound {
            let address = LogAddress::new(*cursor);
            let bytes = match self.space.read(address) {
                Ok(bytes) => bytes,
                Err(e) => return Err(e.into()),
            };
            match LogEntry::decode(&bytes) {
                Ok(entry) => {
                    *cursor += 1;
                    if entry.contains_stream(&self.id) {
                        return Ok(Some(StreamEntry {
                            timestamp: Timestamp::At(address),
                            entry,
                        }));
                    }
                }
                Err(_) => {
                    // Not an entry we understand; other systems may share
                    // the global order.
                    debug!(%address, "skipping unrecognized payload");
                    *cursor += 1;
                }
            }
        }
        Ok(None)
    }

    /// Direct, non-scanning read at a timestamp. A hole, an entry that does
    /// not belong to this stream, or an undecodable payload all surface as
    /// `HoleEncountered`; trims propagate.
    pub fn read_at(&self, timestamp: Timestamp) -> StreamResult<StreamEntry> {
        let address = timestamp
            .require_address()
            .map_err(|e| StreamError::InvalidTimestamp(e.to_string()))?;
        let bytes = self.space.read(address)?;
        let entry = LogEntry::decode(&bytes)
            .map_err(|_| StreamError::HoleEncountered { address })?;
        if !entry.contains_stream(&self.id) {
            return Err(StreamError::HoleEncountered { address });
        }
        Ok(StreamEntry {
            timestamp: Timestamp::At(address),
            entry,
        })
    }

    /// Fill a hole with the no-op entry so scans can proceed. Losing the
    /// race to the address's original writer is success: the hole is gone
    /// either way.
    pub fn fill(&self, address: LogAddress) -> StreamResult<()> {
        let bytes = LogEntry::filler().encode()?;
        match self.space.write(address, &bytes) {
            Ok(()) => Ok(()),
            Err(weft_space::SpaceError::Overwrite { .. }) => {
                debug!(%address, "hole completed by a concurrent writer");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Pure arithmetic: the timestamp one slot later. Does not consult
    /// storage.
    pub fn next_timestamp(&self, ts: Timestamp) -> Timestamp {
        ts.next()
    }

    /// Pure arithmetic: the timestamp one slot earlier.
    pub fn previous_timestamp(&self, ts: Timestamp) -> Timestamp {
        ts.prev()
    }

    /// A linearization bound for this stream. Fresh (`cached == false`):
    /// the most recently issued global address. Cached: the last bound this
    /// handle observed.
    pub fn check(&self, cached: bool) -> StreamResult<Timestamp> {
        if cached {
            return Ok(*self.last_check.lock().expect("lock poisoned"));
        }
        let current = self.sequencer.current()?;
        let bound = current
            .prev()
            .map(Timestamp::At)
            .unwrap_or(Timestamp::Invalid);
        *self.last_check.lock().expect("lock poisoned") = bound;
        Ok(bound)
    }

    /// The last address this handle actually consumed, or `Invalid` before
    /// the first read.
    pub fn current_position(&self) -> Timestamp {
        let cursor = *self.cursor.lock().expect("lock poisoned");
        match cursor.checked_sub(1) {
            Some(consumed) => Timestamp::at(consumed),
            None => Timestamp::Invalid,
        }
    }

    /// Advisory: everything at or below this position may be reclaimed.
    pub fn trim(&self, timestamp: Timestamp) -> StreamResult<()> {
        let address = timestamp
            .require_address()
            .map_err(|e| StreamError::InvalidTimestamp(e.to_string()))?;
        self.space.trim(address)?;
        Ok(())
    }
}
