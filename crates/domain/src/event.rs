//! Domain event value model.

use std::collections::HashMap;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use common::{AggregateId, EntityId};
use event_store::{EventEnvelope, Sequence};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::DomainError;

/// Trait for domain event payloads.
///
/// An aggregate usually declares one enum implementing this trait, with a
/// variant per concrete event kind. Events are facts and are named in past
/// tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// Name of the concrete event kind, e.g. `"OrderShipped"`.
    fn event_type(&self) -> &'static str;
}

/// Enrichment attached to an event at authoring time (correlation ids and the like).
pub type EventMetadata = HashMap<String, serde_json::Value>;

/// Identity and position of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    pub aggregate_root_id: AggregateId,

    /// `Some` for events scoped to one child entity of the aggregate.
    pub entity_id: Option<EntityId>,

    pub sequence: Sequence,

    pub event_date: DateTime<Utc>,
}

impl EventHeader {
    pub fn new(aggregate_root_id: AggregateId, sequence: Sequence) -> Self {
        Self {
            aggregate_root_id,
            entity_id: None,
            sequence,
            event_date: Utc::now(),
        }
    }

    pub fn for_entity(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn is_entity_scoped(&self) -> bool {
        self.entity_id.is_some()
    }
}

/// A domain event payload together with its header and metadata.
///
/// Records are created by an aggregate when it applies an event, or decoded
/// from storage for replay. Once queued on an aggregate they are only ever
/// handed out by shared reference.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord<E> {
    header: EventHeader,
    metadata: EventMetadata,
    payload: E,
}

impl<E: DomainEvent> EventRecord<E> {
    pub fn new(header: EventHeader, payload: E) -> Self {
        Self {
            header,
            metadata: EventMetadata::new(),
            payload,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn aggregate_root_id(&self) -> AggregateId {
        self.header.aggregate_root_id
    }

    pub fn entity_id(&self) -> Option<EntityId> {
        self.header.entity_id
    }

    pub fn sequence(&self) -> Sequence {
        self.header.sequence
    }

    pub fn event_date(&self) -> DateTime<Utc> {
        self.header.event_date
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    pub(crate) fn header_mut(&mut self) -> &mut EventHeader {
        &mut self.header
    }

    pub(crate) fn parts_mut(&mut self) -> (&EventHeader, &mut EventMetadata) {
        (&self.header, &mut self.metadata)
    }

    /// Encodes the record for the event store.
    pub fn to_envelope(&self, aggregate_type: &str) -> Result<EventEnvelope, DomainError> {
        let envelope = EventEnvelope::builder()
            .aggregate_id(self.header.aggregate_root_id)
            .aggregate_type(aggregate_type)
            .entity_id(self.header.entity_id)
            .event_type(self.event_type())
            .sequence(self.header.sequence)
            .event_date(self.header.event_date)
            .metadata_map(self.metadata.clone())
            .payload(&self.payload)?
            .build()?;
        Ok(envelope)
    }

    /// Decodes a stored envelope back into a typed record.
    pub fn from_envelope(envelope: EventEnvelope) -> Result<Self, serde_json::Error> {
        let payload: E = serde_json::from_value(envelope.payload)?;
        Ok(Self {
            header: EventHeader {
                aggregate_root_id: envelope.aggregate_id,
                entity_id: envelope.entity_id,
                sequence: envelope.sequence,
                event_date: envelope.event_date,
            },
            metadata: envelope.metadata,
            payload,
        })
    }
}
