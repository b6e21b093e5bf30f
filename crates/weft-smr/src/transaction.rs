use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use weft_stream::{LogRuntime, StreamFactory};
use weft_types::{LogEntry, StreamId, Timestamp};

use crate::engine::{PassThroughEngine, SmrEngine, SmrObject};
use crate::error::{SmrError, SmrResult};
use crate::records::{CommitRecord, SmrRecord};

/// Buffered transaction effects: encoded commands per participant stream,
/// in execution order. Nothing reaches the log until `propose`.
#[derive(Default)]
pub struct TxBuffer {
    writes: BTreeMap<StreamId, Vec<Vec<u8>>>,
}

impl TxBuffer {
    /// Buffer one command for a participant stream.
    pub fn append<C: Serialize>(&mut self, stream: StreamId, command: &C) -> SmrResult<()> {
        let encoded =
            bincode::serialize(command).map_err(|e| SmrError::Codec(e.to_string()))?;
        self.writes.entry(stream).or_default().push(encoded);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// The engine a transaction executes against: either a borrowing view of
/// the engine it is already running on, or a one-shot snapshot of another
/// participant stream.
pub enum TxEngine<'a, T: SmrObject> {
    PassThrough(PassThroughEngine<'a, T>),
    OneShot(SmrEngine<T>),
}

impl<'a, T: SmrObject> TxEngine<'a, T> {
    pub fn object(&self) -> &T {
        match self {
            Self::PassThrough(engine) => engine.object(),
            Self::OneShot(engine) => engine.object(),
        }
    }

    /// The position the state is materialized at.
    pub fn at(&self) -> Timestamp {
        match self {
            Self::PassThrough(engine) => engine.at(),
            Self::OneShot(engine) => engine.applied_up_to(),
        }
    }
}

struct ExecutingContext<'a> {
    stream: StreamId,
    object: &'a dyn Any,
}

/// A transaction: a command bound to a snapshot timestamp and a set of
/// participant streams.
///
/// Reads go through engines obtained from [`engine`](Self::engine), giving a
/// consistent cross-stream view as of one logical point in the global order.
/// Writes are buffered and only reach the log when [`propose`](Self::propose)
/// appends them as a single commit record tagged for every participant.
/// Validity is optimistic: checked by each replaying engine at apply time,
/// not at propose time.
pub struct Transaction<'a> {
    snapshot: Timestamp,
    runtime: Arc<LogRuntime>,
    executing: Option<ExecutingContext<'a>>,
    participants: Mutex<BTreeSet<StreamId>>,
    buffer: Mutex<TxBuffer>,
}

impl<'a> Transaction<'a> {
    /// A transaction bound to the engine it is already executing on.
    /// Snapshot isolation within that stream is free: the transaction sees
    /// the executing engine's in-progress state, never re-reading storage.
    pub fn bound<E: SmrObject>(
        executing: &'a SmrEngine<E>,
        snapshot: Timestamp,
        runtime: Arc<LogRuntime>,
    ) -> Self {
        let mut participants = BTreeSet::new();
        participants.insert(executing.stream_id());
        Self {
            snapshot,
            runtime,
            executing: Some(ExecutingContext {
                stream: executing.stream_id(),
                object: executing.object_any(),
            }),
            participants: Mutex::new(participants),
            buffer: Mutex::new(TxBuffer::default()),
        }
    }

    /// A free-standing multi-stream transaction.
    pub fn standalone(snapshot: Timestamp, runtime: Arc<LogRuntime>) -> Transaction<'static> {
        Transaction {
            snapshot,
            runtime,
            executing: None,
            participants: Mutex::new(BTreeSet::new()),
            buffer: Mutex::new(TxBuffer::default()),
        }
    }

    pub fn snapshot(&self) -> Timestamp {
        self.snapshot
    }

    /// Declare an additional participant before proposal.
    pub fn register_stream(&self, stream: StreamId) {
        self.participants
            .lock()
            .expect("lock poisoned")
            .insert(stream);
    }

    /// An engine for a transactional context on the given stream.
    ///
    /// The stream the transaction is already executing on yields a
    /// pass-through over the executing engine's materialized object (the
    /// requested type must match). Any other stream is opened fresh and
    /// synced one-shot to the transaction's snapshot.
    pub fn engine<T>(&self, stream: StreamId) -> SmrResult<TxEngine<'_, T>>
    where
        T: SmrObject + Default,
    {
        self.register_stream(stream);
        if let Some(executing) = &self.executing {
            if executing.stream == stream {
                let object = executing
                    .object
                    .downcast_ref::<T>()
                    .ok_or(SmrError::ObjectType)?;
                return Ok(TxEngine::PassThrough(PassThroughEngine::wrap(
                    object,
                    self.snapshot,
                )));
            }
        }
        let handle = self.runtime.open(stream)?;
        let engine = SmrEngine::one_shot(handle, T::default(), self.snapshot)?;
        Ok(TxEngine::OneShot(engine))
    }

    /// Run the bound command against an engine's object. Side effects are
    /// buffered as stream appends, applied only at `propose`.
    pub fn execute<T, R>(
        &self,
        engine: &TxEngine<'_, T>,
        command: impl FnOnce(&T, &mut TxBuffer) -> R,
    ) -> R
    where
        T: SmrObject,
    {
        let mut buffer = self.buffer.lock().expect("lock poisoned");
        command(engine.object(), &mut buffer)
    }

    /// Append the buffered effects as one commit record, reachable by every
    /// participant stream, and return its position.
    ///
    /// A transaction bound to a single already-running engine is purely
    /// local: there is nothing to linearize against other participants, so
    /// proposing it is unsupported and fails fast.
    pub fn propose(self) -> SmrResult<Timestamp> {
        if self.executing.is_some() {
            return Err(SmrError::LocalTxPropose);
        }
        let buffer = self.buffer.into_inner().expect("lock poisoned");
        if buffer.is_empty() {
            return Err(SmrError::EmptyTransaction);
        }
        let mut participants = self.participants.into_inner().expect("lock poisoned");
        participants.extend(buffer.writes.keys().copied());

        let record = SmrRecord::Commit(CommitRecord {
            snapshot: self.snapshot,
            writes: buffer.writes,
        });
        let entry = LogEntry::tagged(participants.into_iter().collect(), record.encode()?);
        let timestamp = self.runtime.append_entry(&entry)?;
        debug!(%timestamp, "transaction proposed");
        Ok(timestamp)
    }
}
