use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Sequence, Snapshot,
    store::{EventStore, SnapshotStore, validate_events_for_append},
};

/// In-memory event store.
///
/// Cloning shares the underlying streams, so a test can hand one clone to a
/// repository and inspect another.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<AggregateId, Vec<EventEnvelope>>>>,
    append_calls: Arc<AtomicUsize>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all aggregates.
    pub async fn event_count(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }

    /// Number of `append` calls made, successful or not.
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    pub async fn clear(&self) {
        self.streams.write().await.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn get_events(
        &self,
        aggregate_id: AggregateId,
        after: Sequence,
    ) -> Result<Vec<EventEnvelope>> {
        let streams = self.streams.read().await;
        let events = streams
            .get(&aggregate_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.sequence > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(events)
    }

    async fn append(&self, events: Vec<EventEnvelope>) -> Result<Sequence> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        validate_events_for_append(&events)?;

        let aggregate_id = events[0].aggregate_id;
        let first = events[0].sequence;

        let mut streams = self.streams.write().await;
        let stream = streams.entry(aggregate_id).or_default();
        let current = stream
            .last()
            .map(|e| e.sequence)
            .unwrap_or(Sequence::initial());

        // Unique (aggregate_id, sequence) and no gaps.
        if first <= current {
            return Err(EventStoreError::DuplicateSequence {
                aggregate_id,
                sequence: first,
            });
        }
        if first != current.next() {
            return Err(EventStoreError::SequenceGap {
                aggregate_id,
                expected: current.next(),
                actual: first,
            });
        }

        let last = events.last().map(|e| e.sequence).unwrap_or(current);
        tracing::debug!(%aggregate_id, count = events.len(), %last, "events appended");
        stream.extend(events);

        Ok(last)
    }

    async fn current_sequence(&self, aggregate_id: AggregateId) -> Result<Option<Sequence>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(&aggregate_id)
            .and_then(|stream| stream.last())
            .map(|e| e.sequence))
    }
}

/// In-memory snapshot store keeping the latest snapshot per aggregate.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<RwLock<HashMap<AggregateId, Snapshot>>>,
    save_calls: Arc<AtomicUsize>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.read().await.get(&aggregate_id).cloned())
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.snapshots
            .write()
            .await
            .insert(snapshot.aggregate_id, snapshot);
        Ok(())
    }
}
