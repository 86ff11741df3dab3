use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Sequence, Snapshot};

/// Durable, append-only log of events keyed by aggregate id and sequence.
///
/// Implementations must treat `(aggregate_id, sequence)` as unique and reject
/// appends that collide with or skip over stored sequences. The domain core
/// performs no locking of its own and relies on this to detect two saves made
/// from the same stale aggregate.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Returns the events of an aggregate whose sequence is strictly greater
    /// than `after`, in ascending sequence order.
    async fn get_events(
        &self,
        aggregate_id: AggregateId,
        after: Sequence,
    ) -> Result<Vec<EventEnvelope>>;

    /// Appends a batch of events for a single aggregate atomically.
    ///
    /// Returns the sequence of the last appended event.
    async fn append(&self, events: Vec<EventEnvelope>) -> Result<Sequence>;

    /// Highest stored sequence of an aggregate, `None` if it has no events.
    async fn current_sequence(&self, aggregate_id: AggregateId) -> Result<Option<Sequence>>;
}

/// Holds at most one snapshot per aggregate.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;

    /// Saves a snapshot, superseding any previous one for the aggregate.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;
}

#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn append_event(&self, event: EventEnvelope) -> Result<Sequence> {
        self.append(vec![event]).await
    }

    /// Returns the complete stream of an aggregate.
    async fn get_all_events(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.get_events(aggregate_id, Sequence::initial()).await
    }

    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.current_sequence(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks the shape of a batch before it reaches storage: non-empty, one
/// aggregate, contiguous ascending sequences.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut expected = first.sequence;
    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(
                "all events in a batch must belong to the same aggregate".to_string(),
            ));
        }
        expected = expected.next();
        if event.sequence != expected {
            return Err(EventStoreError::InvalidAppend(format!(
                "sequences must be contiguous: expected {expected}, got {}",
                event.sequence
            )));
        }
    }

    Ok(())
}
