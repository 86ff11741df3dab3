//! Domain error types.

use common::{AggregateId, EntityId};
use event_store::{EventStoreError, Sequence};
use thiserror::Error;

use crate::bus::BusError;

/// Failure raised by a single event handler while applying an event.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The handler was routed an event variant it does not accept.
    #[error("handler expected {expected}, got {actual}")]
    PayloadMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A root operation (id assignment, entity registration) failed inside a handler.
    #[error(transparent)]
    Aggregate(Box<AggregateError>),

    #[error("{0}")]
    Rejected(String),
}

impl From<AggregateError> for ApplyError {
    fn from(err: AggregateError) -> Self {
        ApplyError::Aggregate(Box::new(err))
    }
}

impl ApplyError {
    /// Builds a [`ApplyError::PayloadMismatch`] for a handler registered for
    /// `expected` that received `actual`.
    pub fn mismatch<E: crate::DomainEvent>(expected: &'static str, actual: &E) -> Self {
        Self::PayloadMismatch {
            expected,
            actual: actual.event_type(),
        }
    }
}

/// Errors raised by the aggregate/entity event application model.
///
/// These indicate a defect in how an aggregate or its events are wired, not a
/// transient condition, and are never swallowed.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Dispatching an event to its handler failed.
    ///
    /// `delegate_cause` holds the custom delegate's failure when the default
    /// mechanism was tried as a fallback and failed too.
    #[error("failed to apply {event_type} (sequence {sequence}) to {target}: {cause}")]
    Invocation {
        target: &'static str,
        event_type: &'static str,
        sequence: Sequence,
        #[source]
        cause: ApplyError,
        delegate_cause: Option<ApplyError>,
    },

    #[error("{aggregate_type} has no id assigned")]
    IdNotAssigned { aggregate_type: &'static str },

    #[error("{aggregate_type} already has id {current}, cannot reassign to {attempted}")]
    IdConflict {
        aggregate_type: &'static str,
        current: AggregateId,
        attempted: AggregateId,
    },

    #[error("{entity_type} {entity_id} is already registered with another aggregate")]
    EntityAttached {
        entity_type: &'static str,
        entity_id: EntityId,
    },

    #[error("failed to restore {aggregate_type} from snapshot at sequence {sequence}: {cause}")]
    SnapshotRestore {
        aggregate_type: &'static str,
        sequence: Sequence,
        #[source]
        cause: ApplyError,
    },

    #[error("event of aggregate {event_aggregate_id} cannot be replayed into {aggregate_id}")]
    ForeignEvent {
        aggregate_id: AggregateId,
        event_aggregate_id: AggregateId,
    },

    /// Two historical events share a sequence number.
    #[error("sequence {sequence} appears more than once in the replayed stream")]
    DuplicateSequence { sequence: Sequence },

    #[error("entity {entity_id} is not registered on {aggregate_type}")]
    UnknownEntity {
        aggregate_type: &'static str,
        entity_id: EntityId,
    },
}

/// Errors surfaced by the repository and command handling.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Command validation refused the command.
    #[error("Command {command_type} rejected: {reason}")]
    Rejected {
        command_type: &'static str,
        #[source]
        reason: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DomainError {
    /// True for failures caused by aggregate wiring rather than by storage,
    /// delivery or business validation. Command handlers let these propagate.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, DomainError::Aggregate(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::AggregateNotFound { .. })
    }
}
