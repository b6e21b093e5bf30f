use std::any::Any;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use weft_stream::{LogStream, StreamError};
use weft_types::{LogAddress, StreamId, Timestamp};

use crate::error::{SmrError, SmrResult};
use crate::records::SmrRecord;

/// An object whose state is derived solely by replaying commands in stream
/// order. `apply` must be deterministic; commands are not commutative in
/// general, which is why replay order is the correctness-critical property.
pub trait SmrObject: Send + 'static {
    type Command: Serialize + DeserializeOwned;

    fn apply(&mut self, command: Self::Command);
}

/// Replays one stream into a materialized object.
///
/// The object is exclusively owned by the engine; it is mutated only by
/// applying entries in strictly increasing address order and is never shared
/// except through an explicit [`pass_through`](Self::pass_through) hand-off.
/// Construct with [`new`](Self::new) for a persistent engine that holds
/// state across calls, or [`one_shot`](Self::one_shot) for a snapshot synced
/// once to a fixed timestamp and then treated as read-only.
pub struct SmrEngine<T: SmrObject> {
    stream: Arc<LogStream>,
    object: T,
    applied_up_to: Timestamp,
}

impl<T: SmrObject> SmrEngine<T> {
    /// A persistent engine starting from the given initial state, nothing
    /// applied yet.
    pub fn new(stream: Arc<LogStream>, initial: T) -> Self {
        Self {
            stream,
            object: initial,
            applied_up_to: Timestamp::Invalid,
        }
    }

    /// A one-shot engine: built fresh, synced to the snapshot timestamp,
    /// then read-only by convention. Used when a transaction needs a
    /// consistent view of a stream it does not otherwise own.
    pub fn one_shot(
        stream: Arc<LogStream>,
        initial: T,
        snapshot: Timestamp,
    ) -> SmrResult<Self> {
        let mut engine = Self::new(stream, initial);
        engine.sync(Some(snapshot))?;
        Ok(engine)
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream.id()
    }

    /// The materialized object. Exclusively owned by this engine.
    pub fn object(&self) -> &T {
        &self.object
    }

    /// The object as `Any`, for the transaction layer's pass-through
    /// hand-off to a dynamically chosen engine.
    pub fn object_any(&self) -> &dyn Any {
        &self.object
    }

    /// The highest address applied so far; `Invalid` before the first one.
    pub fn applied_up_to(&self) -> Timestamp {
        self.applied_up_to
    }

    /// A borrowing view over this engine's current state for a transaction
    /// executing on the same stream. No copy, no re-read of storage; the
    /// engine remains the owner.
    pub fn pass_through(&self) -> PassThroughEngine<'_, T> {
        PassThroughEngine {
            object: &self.object,
            at: self.applied_up_to,
        }
    }

    /// Propose one command by appending it to the engine's stream. The
    /// object does not change until the entry is replayed by `sync`.
    pub fn propose(&self, command: &T::Command) -> SmrResult<Timestamp> {
        let encoded =
            bincode::serialize(command).map_err(|e| SmrError::Codec(e.to_string()))?;
        let payload = SmrRecord::Mutation(encoded).encode()?;
        Ok(self.stream.append(payload)?)
    }

    /// Apply stream entries in strictly increasing address order until the
    /// applied position reaches `target` (or the stream is exhausted when
    /// `target` is `None` — a "catch up to now" sync).
    ///
    /// A hole propagates as retryable [`SmrError::Hole`]; a trim below the
    /// replay position is fatal, the state cannot be reconstructed.
    pub fn sync(&mut self, target: Option<Timestamp>) -> SmrResult<()> {
        let bound = match target {
            None | Some(Timestamp::Max) => None,
            Some(Timestamp::Min) => return Ok(()),
            Some(Timestamp::Invalid) => return Err(SmrError::InvalidTarget),
            Some(Timestamp::At(address)) => Some(address),
        };
        loop {
            let next = match bound {
                // Never scan past the target: an entry beyond it belongs to
                // a later state and must stay unconsumed.
                Some(limit) => self.stream.read_next_up_to(limit),
                None => self.stream.read_next(),
            };
            match next {
                Ok(Some(stream_entry)) => {
                    let address = stream_entry
                        .timestamp
                        .address()
                        .expect("scan results carry real addresses");
                    self.apply_entry(address, &stream_entry.entry.payload)?;
                    self.applied_up_to = stream_entry.timestamp;
                    if let Some(bound) = bound {
                        if address >= bound {
                            return Ok(());
                        }
                    }
                }
                Ok(None) => return Ok(()),
                Err(StreamError::HoleEncountered { address }) => {
                    return Err(SmrError::Hole { address })
                }
                Err(StreamError::Trimmed { address }) => {
                    return Err(SmrError::HistoryTrimmed { address })
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Sync, filling any holes encountered along the way. Hole-filling is
    /// safe here because the filler entry tags no stream.
    pub fn fill_and_resync(&mut self, target: Option<Timestamp>) -> SmrResult<()> {
        loop {
            match self.sync(target) {
                Err(SmrError::Hole { address }) => {
                    debug!(%address, "filling hole during sync");
                    self.stream.fill(address)?;
                }
                other => return other,
            }
        }
    }

    /// Consume the engine, handing the materialized object to the caller.
    pub fn into_object(self) -> T {
        self.object
    }

    fn apply_entry(&mut self, address: LogAddress, payload: &[u8]) -> SmrResult<()> {
        let record = match SmrRecord::decode(payload) {
            Ok(record) => record,
            Err(_) => {
                // Tagged for this stream but not an SMR record; another
                // consumer's data sharing the identifier is skipped, not
                // fatal.
                debug!(%address, "skipping non-SMR payload during replay");
                return Ok(());
            }
        };
        match record {
            SmrRecord::Mutation(encoded) => {
                let command: T::Command = bincode::deserialize(&encoded)
                    .map_err(|e| SmrError::Codec(e.to_string()))?;
                self.object.apply(command);
                trace!(%address, "applied mutation");
            }
            SmrRecord::Commit(commit) => {
                let id = self.stream.id();
                if !commit.valid_at(address, &id) {
                    debug!(%address, "skipping aborted or foreign commit");
                    return Ok(());
                }
                let writes = commit.writes.get(&id).expect("validity checked");
                for encoded in writes {
                    let command: T::Command = bincode::deserialize(encoded)
                        .map_err(|e| SmrError::Codec(e.to_string()))?;
                    self.object.apply(command);
                }
                trace!(%address, "applied transaction commit");
            }
        }
        Ok(())
    }
}

/// A borrowing engine over another engine's already-materialized state.
///
/// Used when a transaction executes against the same stream it is already
/// running on: the transaction sees exactly the executing engine's
/// in-progress state, without duplicate replay. The executing engine stays
/// the owner; the borrower must not mutate independently.
pub struct PassThroughEngine<'a, T> {
    object: &'a T,
    at: Timestamp,
}

impl<'a, T> PassThroughEngine<'a, T> {
    pub fn wrap(object: &'a T, at: Timestamp) -> Self {
        Self { object, at }
    }

    pub fn object(&self) -> &T {
        self.object
    }

    /// The position the borrowed state is materialized at.
    pub fn at(&self) -> Timestamp {
        self.at
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::Deserialize;
    use weft_space::{
        InMemoryLogUnit, LocalSequencer, LogUnit, Sequencer, StaticResolver,
        StaticViewProvider, WriteOnceAddressSpace,
    };
    use weft_stream::{LogRuntime, StreamFactory};
    use weft_types::{NodeId, ReplicaGroup, View};

    use super::*;

    #[derive(Default, Debug, PartialEq, Eq)]
    struct Register {
        value: i64,
        history: Vec<i64>,
    }

    #[derive(Serialize, Deserialize)]
    enum RegisterOp {
        Set(i64),
        Add(i64),
    }

    impl SmrObject for Register {
        type Command = RegisterOp;

        fn apply(&mut self, command: RegisterOp) {
            match command {
                RegisterOp::Set(v) => self.value = v,
                RegisterOp::Add(v) => self.value += v,
            }
            self.history.push(self.value);
        }
    }

    fn runtime() -> (Arc<LogRuntime>, Arc<LocalSequencer>) {
        let view =
            View::single_segment(0, vec![ReplicaGroup::new(vec![NodeId::from("n0")])]).unwrap();
        let resolver: StaticResolver = [(
            NodeId::from("n0"),
            Arc::new(InMemoryLogUnit::new(0)) as Arc<dyn LogUnit>,
        )]
        .into_iter()
        .collect();
        let space = Arc::new(WriteOnceAddressSpace::new(
            Arc::new(StaticViewProvider::new(view)),
            Arc::new(resolver),
        ));
        let sequencer = Arc::new(LocalSequencer::new());
        (
            Arc::new(LogRuntime::new(
                Arc::clone(&sequencer) as Arc<dyn weft_space::Sequencer>,
                space,
            )),
            sequencer,
        )
    }

    #[test]
    fn sync_applies_proposals_in_order() {
        let (runtime, _) = runtime();
        let id = weft_types::StreamId::new();
        let mut engine =
            SmrEngine::new(runtime.open(id).unwrap(), Register::default());

        engine.propose(&RegisterOp::Set(10)).unwrap();
        engine.propose(&RegisterOp::Add(5)).unwrap();
        let last = engine.propose(&RegisterOp::Add(1)).unwrap();

        engine.sync(None).unwrap();
        assert_eq!(engine.object().value, 16);
        assert_eq!(engine.object().history, vec![10, 15, 16]);
        assert_eq!(engine.applied_up_to(), last);
    }

    #[test]
    fn replay_is_deterministic() {
        let (runtime, _) = runtime();
        let id = weft_types::StreamId::new();
        let mut first = SmrEngine::new(runtime.open(id).unwrap(), Register::default());
        first.propose(&RegisterOp::Set(3)).unwrap();
        first.propose(&RegisterOp::Add(4)).unwrap();
        first.sync(None).unwrap();

        // A fresh engine on a re-opened handle replays to identical state.
        let mut second = SmrEngine::new(runtime.open(id).unwrap(), Register::default());
        second.sync(None).unwrap();
        assert_eq!(first.object(), second.object());
        assert_eq!(first.applied_up_to(), second.applied_up_to());
    }

    #[test]
    fn one_shot_stops_at_its_snapshot() {
        let (runtime, _) = runtime();
        let id = weft_types::StreamId::new();
        let writer = SmrEngine::new(runtime.open(id).unwrap(), Register::default());
        let early = writer.propose(&RegisterOp::Set(1)).unwrap();
        writer.propose(&RegisterOp::Set(99)).unwrap();

        let snapshot =
            SmrEngine::one_shot(runtime.open(id).unwrap(), Register::default(), early).unwrap();
        assert_eq!(snapshot.object().value, 1);
        assert_eq!(snapshot.applied_up_to(), early);
    }

    #[test]
    fn one_shot_between_entries_does_not_overshoot() {
        let (runtime, sequencer) = runtime();
        let id = weft_types::StreamId::new();
        let writer = SmrEngine::new(runtime.open(id).unwrap(), Register::default());
        writer.propose(&RegisterOp::Set(1)).unwrap();
        // Two addresses issued to other activity, then another own entry.
        sequencer.next().unwrap();
        let gap = Timestamp::At(sequencer.next().unwrap());
        writer.propose(&RegisterOp::Set(99)).unwrap();

        // Holes below the snapshot stop the one-shot sync; fill them and
        // build the snapshot again.
        assert!(matches!(
            SmrEngine::one_shot(runtime.open(id).unwrap(), Register::default(), gap),
            Err(SmrError::Hole { .. })
        ));
        let mut engine = SmrEngine::new(runtime.open(id).unwrap(), Register::default());
        engine.fill_and_resync(Some(gap)).unwrap();
        // The entry past the snapshot was never applied.
        assert_eq!(engine.object().value, 1);
    }

    #[test]
    fn sync_to_min_applies_nothing() {
        let (runtime, _) = runtime();
        let id = weft_types::StreamId::new();
        let writer = SmrEngine::new(runtime.open(id).unwrap(), Register::default());
        writer.propose(&RegisterOp::Set(7)).unwrap();

        let engine = SmrEngine::one_shot(
            runtime.open(id).unwrap(),
            Register::default(),
            Timestamp::Min,
        )
        .unwrap();
        assert_eq!(engine.object().value, 0);
    }

    #[test]
    fn hole_is_retryable_and_fillable() {
        let (runtime, sequencer) = runtime();
        let id = weft_types::StreamId::new();
        let mut engine = SmrEngine::new(runtime.open(id).unwrap(), Register::default());

        let hole = sequencer.next().unwrap();
        engine.propose(&RegisterOp::Set(2)).unwrap();

        assert_eq!(engine.sync(None), Err(SmrError::Hole { address: hole }));
        engine.fill_and_resync(None).unwrap();
        assert_eq!(engine.object().value, 2);
    }

    #[test]
    fn trim_below_replay_start_is_fatal() {
        let (runtime, _) = runtime();
        let id = weft_types::StreamId::new();
        let stream = runtime.open(id).unwrap();
        let mut engine = SmrEngine::new(Arc::clone(&stream), Register::default());
        let first = stream.append(SmrRecord::Mutation(
            bincode::serialize(&RegisterOp::Set(1)).unwrap(),
        )
        .encode()
        .unwrap())
        .unwrap();
        stream.trim(first).unwrap();

        assert_eq!(
            engine.sync(None),
            Err(SmrError::HistoryTrimmed {
                address: first.address().unwrap()
            })
        );
    }

    #[test]
    fn pass_through_borrows_current_state() {
        let (runtime, _) = runtime();
        let id = weft_types::StreamId::new();
        let mut engine = SmrEngine::new(runtime.open(id).unwrap(), Register::default());
        engine.propose(&RegisterOp::Set(41)).unwrap();
        engine.sync(None).unwrap();

        let view = engine.pass_through();
        assert_eq!(view.object().value, 41);
        assert_eq!(view.at(), engine.applied_up_to());
    }

    #[test]
    fn foreign_payloads_in_own_stream_are_skipped() {
        let (runtime, _) = runtime();
        let id = weft_types::StreamId::new();
        let stream = runtime.open(id).unwrap();
        // Something other than an SMR record, tagged for this stream.
        stream.append(b"not-a-record".to_vec()).unwrap();

        let mut engine = SmrEngine::new(runtime.open(id).unwrap(), Register::default());
        engine.propose(&RegisterOp::Set(5)).unwrap();
        engine.sync(None).unwrap();
        assert_eq!(engine.object().value, 5);
    }
}
