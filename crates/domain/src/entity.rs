//! Child entities living inside an aggregate.
//!
//! Entities have their own identity but no event log of their own. Events
//! scoped to an entity are authored through the owning root
//! ([`Aggregate::apply_to_entity`]), sequenced in the root's single stream and
//! dispatched to the root's handlers first, then to the entity's.

use std::sync::Arc;

use common::{AggregateId, EntityId};

use crate::aggregate::{Aggregate, AggregateRoot, RootSlot};
use crate::dispatch::Dispatcher;
use crate::error::{AggregateError, ApplyError};
use crate::event::{DomainEvent, EventRecord};

/// Identity and dispatch state embedded in every entity.
pub struct AggregateEntity<T: Entity> {
    id: EntityId,
    root: Option<RootSlot>,
    dispatcher: Dispatcher<T, T::Event>,
}

impl<T: Entity> AggregateEntity<T> {
    pub fn new(id: EntityId) -> Self {
        Self::with_dispatcher(id, Dispatcher::default())
    }

    pub fn with_dispatcher(id: EntityId, dispatcher: Dispatcher<T, T::Event>) -> Self {
        Self {
            id,
            root: None,
            dispatcher,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Id of the owning aggregate, once registered and once the root has one.
    pub fn root_id(&self) -> Option<AggregateId> {
        self.root.as_ref().and_then(|slot| slot.get().copied())
    }

    pub fn is_attached(&self) -> bool {
        self.root.is_some()
    }

    /// Points this entity at a root. Re-attaching to a different instance of
    /// the same aggregate is allowed; anything else is rejected.
    pub(crate) fn attach(&mut self, slot: RootSlot) -> Result<(), AggregateError> {
        if let Some(current) = &self.root
            && !Arc::ptr_eq(current, &slot)
        {
            match (current.get(), slot.get()) {
                (Some(a), Some(b)) if a == b => {}
                _ => {
                    return Err(AggregateError::EntityAttached {
                        entity_type: T::entity_type(),
                        entity_id: self.id,
                    });
                }
            }
        }
        self.root = Some(slot);
        Ok(())
    }
}

impl<T: Entity> std::fmt::Debug for AggregateEntity<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateEntity")
            .field("entity_type", &T::entity_type())
            .field("id", &self.id)
            .field("root_id", &self.root_id())
            .finish()
    }
}

/// Trait for child entities of an aggregate.
pub trait Entity: Send + Sync + Sized + 'static {
    /// Same event type as the owning aggregate.
    type Event: DomainEvent;

    fn entity_type() -> &'static str;

    fn entity(&self) -> &AggregateEntity<Self>;

    fn entity_mut(&mut self) -> &mut AggregateEntity<Self>;

    /// Default dispatch mechanism for events scoped to this entity.
    fn handle_event(&mut self, event: &EventRecord<Self::Event>) -> Result<(), ApplyError> {
        let _ = event;
        Ok(())
    }

    fn id(&self) -> EntityId {
        self.entity().id()
    }

    fn root_id(&self) -> Option<AggregateId> {
        self.entity().root_id()
    }

    /// Routes one event through this entity's dispatcher.
    fn dispatch(&mut self, event: &EventRecord<Self::Event>) -> Result<(), AggregateError> {
        let dispatcher = self.entity().dispatcher.clone();
        dispatcher.dispatch(self, event, Self::entity_type(), Self::handle_event)
    }

    /// Replays the events scoped to this entity into local state only.
    ///
    /// Events for other entities or for the root are skipped. The root's
    /// sequence counter and log are not touched.
    fn apply_historical(&mut self, mut events: Vec<EventRecord<Self::Event>>) -> Result<(), AggregateError> {
        let id = self.id();
        events.retain(|e| e.entity_id() == Some(id));
        events.sort_by_key(|e| e.sequence());

        if let Some(root_id) = self.root_id()
            && let Some(foreign) = events.iter().find(|e| e.aggregate_root_id() != root_id)
        {
            return Err(AggregateError::ForeignEvent {
                aggregate_id: root_id,
                event_aggregate_id: foreign.aggregate_root_id(),
            });
        }
        if let Some(pair) = events.windows(2).find(|w| w[0].sequence() == w[1].sequence()) {
            return Err(AggregateError::DuplicateSequence {
                sequence: pair[0].sequence(),
            });
        }

        for event in &events {
            self.dispatch(event)?;
        }
        Ok(())
    }

    /// This entity's share of the root's uncommitted log.
    fn uncommitted_events<'a, A>(&self, root: &'a AggregateRoot<A>) -> Vec<&'a EventRecord<Self::Event>>
    where
        A: Aggregate<Event = Self::Event>,
    {
        root.uncommitted_for(self.id()).collect()
    }
}

/// Object-safe view of an entity, used by the root to dispatch
/// entity-scoped events without knowing the concrete entity type.
pub trait EntityDispatch<E: DomainEvent> {
    fn entity_id(&self) -> EntityId;

    fn dispatch_event(&mut self, event: &EventRecord<E>) -> Result<(), AggregateError>;
}

impl<T: Entity> EntityDispatch<T::Event> for T {
    fn entity_id(&self) -> EntityId {
        self.id()
    }

    fn dispatch_event(&mut self, event: &EventRecord<T::Event>) -> Result<(), AggregateError> {
        self.dispatch(event)
    }
}
