use std::any::{Any, TypeId, type_name};
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::event::{DomainEvent, EventHeader, EventMetadata, EventRecord};

use super::BusError;
use super::resolver::ServiceResolver;

/// A committed event as seen by bus handlers, with its payload type erased.
pub trait PublishedEvent: fmt::Debug + Send + Sync {
    fn header(&self) -> &EventHeader;

    fn metadata(&self) -> &EventMetadata;

    fn event_type(&self) -> &'static str;

    /// `TypeId` of the payload type (the aggregate's event enum).
    fn payload_type(&self) -> TypeId;

    fn payload_type_name(&self) -> &'static str;

    fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error>;

    fn as_any(&self) -> &dyn Any;
}

impl<'a> dyn PublishedEvent + 'a {
    /// Recovers the typed record if the payload is an `E`.
    pub fn downcast<E: DomainEvent>(&self) -> Option<&EventRecord<E>> {
        self.as_any().downcast_ref::<EventRecord<E>>()
    }
}

impl<E: DomainEvent> PublishedEvent for EventRecord<E> {
    fn header(&self) -> &EventHeader {
        EventRecord::header(self)
    }

    fn metadata(&self) -> &EventMetadata {
        EventRecord::metadata(self)
    }

    fn event_type(&self) -> &'static str {
        EventRecord::event_type(self)
    }

    fn payload_type(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn payload_type_name(&self) -> &'static str {
        type_name::<E>()
    }

    fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self.payload())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The set of events a handler subscribes to.
///
/// Selectors nest: [`All`](EventSelector::All) covers every event,
/// [`EntityScoped`](EventSelector::EntityScoped) every event scoped to a
/// child entity, [`Family`](EventSelector::Family) every kind of one payload
/// type and [`Kind`](EventSelector::Kind) a single event kind of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSelector {
    All,
    EntityScoped,
    Family {
        payload: TypeId,
        name: &'static str,
    },
    Kind {
        payload: TypeId,
        name: &'static str,
        event_type: &'static str,
    },
}

impl EventSelector {
    /// Every event whose payload is an `E`.
    pub fn family<E: DomainEvent>() -> Self {
        EventSelector::Family {
            payload: TypeId::of::<E>(),
            name: type_name::<E>(),
        }
    }

    /// Events whose payload is an `E` and whose `event_type()` is `event_type`.
    pub fn kind<E: DomainEvent>(event_type: &'static str) -> Self {
        EventSelector::Kind {
            payload: TypeId::of::<E>(),
            name: type_name::<E>(),
            event_type,
        }
    }

    pub fn matches(&self, event: &dyn PublishedEvent) -> bool {
        match *self {
            EventSelector::All => true,
            EventSelector::EntityScoped => event.header().is_entity_scoped(),
            EventSelector::Family { payload, .. } => event.payload_type() == payload,
            EventSelector::Kind {
                payload, event_type, ..
            } => event.payload_type() == payload && event.event_type() == event_type,
        }
    }
}

impl fmt::Display for EventSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSelector::All => f.write_str("*"),
            EventSelector::EntityScoped => f.write_str("<entity>"),
            EventSelector::Family { name, .. } => f.write_str(name),
            EventSelector::Kind {
                name, event_type, ..
            } => write!(f, "{name}::{event_type}"),
        }
    }
}

/// Failure reported by an [`EventHandler`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Reacts to committed domain events.
///
/// A fresh handler instance is resolved for every publish, so handlers
/// should not rely on state surviving between events.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Events this handler subscribes to.
    fn selector() -> EventSelector
    where
        Self: Sized;

    async fn handle(&self, event: &dyn PublishedEvent) -> Result<(), HandlerError>;
}

/// Registration entry for a handler type.
#[derive(Clone, Copy)]
pub struct HandlerType {
    type_id: TypeId,
    name: &'static str,
    selector: EventSelector,
    resolve: fn(&dyn ServiceResolver) -> Result<Box<dyn EventHandler>, BusError>,
}

impl HandlerType {
    pub fn of<H: EventHandler>() -> Self {
        Self {
            type_id: TypeId::of::<H>(),
            name: type_name::<H>(),
            selector: H::selector(),
            resolve: resolve_as::<H>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn selector(&self) -> EventSelector {
        self.selector
    }

    pub(crate) fn resolve(
        &self,
        resolver: &dyn ServiceResolver,
    ) -> Result<Box<dyn EventHandler>, BusError> {
        (self.resolve)(resolver)
    }
}

impl fmt::Debug for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerType")
            .field("name", &self.name)
            .field("selector", &self.selector)
            .finish()
    }
}

fn resolve_as<H: EventHandler>(
    resolver: &dyn ServiceResolver,
) -> Result<Box<dyn EventHandler>, BusError> {
    let handler = type_name::<H>();
    let service = resolver
        .resolve(TypeId::of::<H>())
        .ok_or(BusError::UnresolvedHandler { handler })?;
    let instance = service
        .downcast::<H>()
        .map_err(|_| BusError::MissingHandlerMethod { handler })?;
    Ok(instance)
}
