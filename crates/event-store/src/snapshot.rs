use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, EntityId, Sequence};

/// Point-in-time capture of an aggregate, used to bound replay cost.
///
/// `sequence` is the aggregate's last event sequence when the snapshot was
/// taken; loading replays only events after it. `state` is whatever the
/// aggregate chose to serialize and is opaque to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub aggregate_id: AggregateId,

    pub aggregate_type: String,

    pub sequence: Sequence,

    pub timestamp: DateTime<Utc>,

    /// Child entities registered on the root at capture time.
    #[serde(default)]
    pub entities: Vec<EntityId>,

    pub state: serde_json::Value,
}

impl Snapshot {
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence: Sequence,
        state: serde_json::Value,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence,
            timestamp: Utc::now(),
            entities: Vec::new(),
            state,
        }
    }

    /// Serializes `state` into a new snapshot.
    pub fn from_state<T: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence: Sequence,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            aggregate_id,
            aggregate_type,
            sequence,
            serde_json::to_value(state)?,
        ))
    }

    pub fn with_entities(mut self, entities: Vec<EntityId>) -> Self {
        self.entities = entities;
        self
    }

    /// Deserializes the captured state.
    pub fn into_state<T: for<'de> Deserialize<'de>>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }
}
