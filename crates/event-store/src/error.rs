use thiserror::Error;

use crate::{AggregateId, Sequence};

/// Errors that can occur when interacting with an event or snapshot store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// An event with this sequence already exists for the aggregate.
    ///
    /// This is how two concurrent saves against the same stale aggregate are
    /// told apart: the second append collides with the first.
    #[error("Duplicate sequence {sequence} for aggregate {aggregate_id}")]
    DuplicateSequence {
        aggregate_id: AggregateId,
        sequence: Sequence,
    },

    /// The appended batch does not continue the stored stream.
    #[error("Sequence gap for aggregate {aggregate_id}: expected {expected}, got {actual}")]
    SequenceGap {
        aggregate_id: AggregateId,
        expected: Sequence,
        actual: Sequence,
    },

    /// The batch itself is malformed (empty, mixed aggregates, non-contiguous).
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// The storage backend failed.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
