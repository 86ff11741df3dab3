use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, EntityId, EventStoreError};

/// Unique identifier of a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event inside its aggregate's stream.
///
/// `0` means "nothing applied yet"; the first event of an aggregate is `1`
/// and every following event increments by exactly one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The sequence of an aggregate with no events.
    pub fn initial() -> Self {
        Self(0)
    }

    /// The sequence of the first event of an aggregate.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn is_initial(&self) -> bool {
        self.0 == 0
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Sequence {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Sequence> for i64 {
    fn from(sequence: Sequence) -> Self {
        sequence.0
    }
}

/// Storage form of a domain event.
///
/// The domain core encodes its typed event records into envelopes before
/// appending them, and decodes them back when replaying. The payload is
/// opaque JSON as far as the store is concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,

    /// Concrete event kind, e.g. "OrderCreated".
    pub event_type: String,

    pub aggregate_id: AggregateId,

    /// Aggregate kind, e.g. "Order".
    pub aggregate_type: String,

    /// Set for events scoped to one child entity of the aggregate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,

    pub sequence: Sequence,

    pub event_date: DateTime<Utc>,

    pub payload: serde_json::Value,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }
}

/// Builder for [`EventEnvelope`].
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    entity_id: Option<EntityId>,
    sequence: Option<Sequence>,
    event_date: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelopeBuilder {
    /// Sets the event id. A random id is generated when omitted.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn entity_id(mut self, id: Option<EntityId>) -> Self {
        self.entity_id = id;
        self
    }

    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Sets the event date. Defaults to now when omitted.
    pub fn event_date(mut self, event_date: DateTime<Utc>) -> Self {
        self.event_date = Some(event_date);
        self
    }

    /// Serializes `payload` into the envelope.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn metadata_map(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Builds the envelope, failing on the first missing required field.
    pub fn build(self) -> crate::Result<EventEnvelope> {
        fn missing(field: &str) -> EventStoreError {
            EventStoreError::InvalidAppend(format!("envelope is missing `{field}`"))
        }

        Ok(EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type.ok_or_else(|| missing("event_type"))?,
            aggregate_id: self.aggregate_id.ok_or_else(|| missing("aggregate_id"))?,
            aggregate_type: self.aggregate_type.ok_or_else(|| missing("aggregate_type"))?,
            entity_id: self.entity_id,
            sequence: self.sequence.ok_or_else(|| missing("sequence"))?,
            event_date: self.event_date.unwrap_or_else(Utc::now),
            payload: self.payload.ok_or_else(|| missing("payload"))?,
            metadata: self.metadata,
        })
    }
}
