//! Opt-in snapshotting of aggregate state.

use event_store::{Sequence, Snapshot};
use serde::{Serialize, de::DeserializeOwned};

use crate::aggregate::Aggregate;
use crate::error::{AggregateError, ApplyError, DomainError};

/// Trait for aggregates that support snapshotting.
///
/// Snapshotting is an optimization to avoid replaying all events when loading
/// an aggregate. The aggregate state is periodically serialized and stored.
/// To enable it, implement this trait and return
/// `Some(SnapshotSupport::new())` from [`Aggregate::snapshot_support`].
pub trait SnapshotCapable: Aggregate {
    /// Serializable image of the aggregate's own state. The root's id,
    /// sequence and entity registry are stored alongside it.
    type State: Serialize + DeserializeOwned;

    fn capture_state(&self) -> Self::State;

    /// Rebuilds state from a captured image.
    ///
    /// The root has already been restored when this runs, so child entities
    /// can be re-registered.
    fn restore_state(&mut self, state: Self::State) -> Result<(), ApplyError>;

    /// Returns the snapshot interval (number of events between snapshots).
    fn snapshot_interval() -> i64 {
        100
    }

    /// Whether enough events were applied since `previous` to take a new one.
    fn should_take_snapshot(&self, previous: Option<&Snapshot>) -> bool {
        let since = previous.map_or(Sequence::initial(), |s| s.sequence);
        self.last_event_sequence().as_i64() - since.as_i64() >= Self::snapshot_interval()
    }
}

/// Type-erased snapshot operations of one aggregate type.
///
/// Lets the repository work with any [`Aggregate`] and only touch
/// snapshots for those that provide this.
pub struct SnapshotSupport<A> {
    capture: fn(&A) -> Result<Snapshot, DomainError>,
    restore: fn(&mut A, Snapshot) -> Result<(), DomainError>,
    should_take: fn(&A, Option<&Snapshot>) -> bool,
}

impl<A> Clone for SnapshotSupport<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for SnapshotSupport<A> {}

impl<A> std::fmt::Debug for SnapshotSupport<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotSupport").finish_non_exhaustive()
    }
}

impl<A: SnapshotCapable> SnapshotSupport<A> {
    pub fn new() -> Self {
        Self {
            capture: capture::<A>,
            restore: restore::<A>,
            should_take: A::should_take_snapshot,
        }
    }
}

impl<A: SnapshotCapable> Default for SnapshotSupport<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Aggregate> SnapshotSupport<A> {
    pub fn capture(&self, aggregate: &A) -> Result<Snapshot, DomainError> {
        (self.capture)(aggregate)
    }

    /// Restores the root (id, sequence, entities) and then the aggregate's state.
    pub fn restore(&self, aggregate: &mut A, snapshot: Snapshot) -> Result<(), DomainError> {
        (self.restore)(aggregate, snapshot)
    }

    pub fn should_take(&self, aggregate: &A, previous: Option<&Snapshot>) -> bool {
        (self.should_take)(aggregate, previous)
    }
}

fn capture<A: SnapshotCapable>(aggregate: &A) -> Result<Snapshot, DomainError> {
    let id = aggregate.id().ok_or(AggregateError::IdNotAssigned {
        aggregate_type: A::aggregate_type(),
    })?;
    let snapshot = Snapshot::from_state(
        id,
        A::aggregate_type(),
        aggregate.last_event_sequence(),
        &aggregate.capture_state(),
    )?;
    Ok(snapshot.with_entities(aggregate.root().entities().to_vec()))
}

fn restore<A: SnapshotCapable>(aggregate: &mut A, snapshot: Snapshot) -> Result<(), DomainError> {
    let sequence = snapshot.sequence;
    aggregate
        .root_mut()
        .restore(snapshot.aggregate_id, sequence, snapshot.entities.clone())?;
    let state: A::State = snapshot.into_state()?;
    aggregate
        .restore_state(state)
        .map_err(|cause| AggregateError::SnapshotRestore {
            aggregate_type: A::aggregate_type(),
            sequence,
            cause,
        })?;
    Ok(())
}
