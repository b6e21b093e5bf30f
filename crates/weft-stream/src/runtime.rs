use std::sync::Arc;

use tracing::trace;

use weft_space::{AddressSpace, Sequencer};
use weft_types::{LogEntry, StreamId, Timestamp};

use crate::error::StreamResult;
use crate::stream::LogStream;

/// Capability to open stream handles.
///
/// Components that open streams mid-flight (the transaction layer opens
/// participant streams for one-shot snapshots) take this explicitly rather
/// than reaching for ambient global state.
pub trait StreamFactory: Send + Sync {
    fn open(&self, id: StreamId) -> StreamResult<Arc<LogStream>>;
}

/// Facade wiring a sequencer and an address space into the shared log.
///
/// Opens streams (each with a fresh cursor) and performs the one append
/// primitive streams cannot: writing a single entry tagged for several
/// streams at once, which is how a transaction commit becomes reachable by
/// every participant.
pub struct LogRuntime {
    sequencer: Arc<dyn Sequencer>,
    space: Arc<dyn AddressSpace>,
}

impl LogRuntime {
    pub fn new(sequencer: Arc<dyn Sequencer>, space: Arc<dyn AddressSpace>) -> Self {
        Self { sequencer, space }
    }

    pub fn sequencer(&self) -> &Arc<dyn Sequencer> {
        &self.sequencer
    }

    pub fn space(&self) -> &Arc<dyn AddressSpace> {
        &self.space
    }

    /// Append one entry, tagged for however many streams it names, at a
    /// single fresh address.
    pub fn append_entry(&self, entry: &LogEntry) -> StreamResult<Timestamp> {
        let address = self.sequencer.next()?;
        let bytes = entry.encode()?;
        self.space.write(address, &bytes)?;
        trace!(%address, streams = entry.streams.len(), "appended tagged entry");
        Ok(Timestamp::At(address))
    }
}

impl StreamFactory for LogRuntime {
    fn open(&self, id: StreamId) -> StreamResult<Arc<LogStream>> {
        Ok(Arc::new(LogStream::open(
            id,
            Arc::clone(&self.sequencer),
            Arc::clone(&self.space),
        )))
    }
}

#[cfg(test)]
mod tests {
    use weft_space::{
        InMemoryLogUnit, LocalSequencer, LogUnit, StaticResolver, StaticViewProvider,
        WriteOnceAddressSpace,
    };
    use weft_types::{NodeId, ReplicaGroup, View};

    use super::*;

    fn runtime() -> LogRuntime {
        let view =
            View::single_segment(0, vec![ReplicaGroup::new(vec![NodeId::from("n0")])]).unwrap();
        let resolver: StaticResolver = [(
            NodeId::from("n0"),
            Arc::new(InMemoryLogUnit::new(0)) as Arc<dyn LogUnit>,
        )]
        .into_iter()
        .collect();
        let space = WriteOnceAddressSpace::new(
            Arc::new(StaticViewProvider::new(view)),
            Arc::new(resolver),
        );
        LogRuntime::new(Arc::new(LocalSequencer::new()), Arc::new(space))
    }

    #[test]
    fn opened_handles_have_independent_cursors() {
        let runtime = runtime();
        let id = StreamId::new();
        let first = runtime.open(id).unwrap();
        first.append(b"x".to_vec()).unwrap();
        assert!(first.read_next().unwrap().is_some());

        // A re-opened handle starts at the log's start.
        let second = runtime.open(id).unwrap();
        assert_eq!(second.read_next().unwrap().unwrap().payload(), b"x");
    }

    #[test]
    fn tagged_append_reaches_every_named_stream() {
        let runtime = runtime();
        let a = StreamId::new();
        let b = StreamId::new();
        let entry = LogEntry::tagged(vec![a, b], b"both".to_vec());
        let ts = runtime.append_entry(&entry).unwrap();

        let stream_a = runtime.open(a).unwrap();
        let stream_b = runtime.open(b).unwrap();
        let got_a = stream_a.read_next().unwrap().unwrap();
        let got_b = stream_b.read_next().unwrap().unwrap();
        assert_eq!(got_a.timestamp, ts);
        assert_eq!(got_b.timestamp, ts);
        assert_eq!(got_a.payload(), b"both");
    }
}
