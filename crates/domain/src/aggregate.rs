//! Aggregate roots and the event application pipeline.
//!
//! An aggregate is a cluster of domain objects treated as one consistency
//! unit. Its state only ever changes by applying events:
//!
//! - [`Aggregate::apply`] authors a new event: it is sequenced, dispatched to
//!   the handlers, stamped with the root id and date, enriched by the event
//!   modifier and queued as uncommitted.
//! - [`Aggregate::apply_historical`] replays stored events: they are
//!   dispatched in sequence order and never queued.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use common::{AggregateId, EntityId};
use event_store::Sequence;
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::entity::{Entity, EntityDispatch};
use crate::error::{AggregateError, ApplyError};
use crate::event::{DomainEvent, EventHeader, EventRecord};
use crate::modifier::EventModifierHook;
use crate::snapshot::SnapshotSupport;

/// Root id shared with registered entities; empty until the id is assigned.
pub(crate) type RootSlot = Arc<OnceLock<AggregateId>>;

/// Book-keeping shared by every aggregate: identity, stream position, the
/// uncommitted event log and the registry of child entities.
pub struct AggregateRoot<A: Aggregate> {
    id: RootSlot,
    last_event_sequence: Sequence,
    uncommitted: Vec<EventRecord<A::Event>>,
    entities: Vec<EntityId>,
    dispatcher: Dispatcher<A, A::Event>,
    modifier: Option<Arc<EventModifierHook>>,
}

impl<A: Aggregate> Default for AggregateRoot<A> {
    fn default() -> Self {
        Self {
            id: RootSlot::default(),
            last_event_sequence: Sequence::initial(),
            uncommitted: Vec::new(),
            entities: Vec::new(),
            dispatcher: Dispatcher::default(),
            modifier: None,
        }
    }
}

impl<A: Aggregate> std::fmt::Debug for AggregateRoot<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRoot")
            .field("aggregate_type", &A::aggregate_type())
            .field("id", &self.id())
            .field("last_event_sequence", &self.last_event_sequence)
            .field("uncommitted", &self.uncommitted.len())
            .field("entities", &self.entities)
            .field("dispatcher", &self.dispatcher)
            .field("modifier", &self.modifier.is_some())
            .finish()
    }
}

impl<A: Aggregate> AggregateRoot<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root whose events go through `dispatcher` before `handle_event`.
    pub fn with_dispatcher(dispatcher: Dispatcher<A, A::Event>) -> Self {
        Self {
            dispatcher,
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<AggregateId> {
        self.id.get().copied()
    }

    /// Sequence of the most recent event applied, authored or replayed.
    pub fn last_event_sequence(&self) -> Sequence {
        self.last_event_sequence
    }

    /// Events authored since the last commit, in authoring order.
    pub fn uncommitted_events(&self) -> &[EventRecord<A::Event>] {
        &self.uncommitted
    }

    /// Uncommitted events scoped to one entity.
    pub fn uncommitted_for(
        &self,
        entity_id: EntityId,
    ) -> impl Iterator<Item = &EventRecord<A::Event>> + '_ {
        self.uncommitted
            .iter()
            .filter(move |e| e.entity_id() == Some(entity_id))
    }

    /// Registered entity ids, in registration order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn is_registered(&self, entity_id: EntityId) -> bool {
        self.entities.contains(&entity_id)
    }

    /// Sets the aggregate id.
    ///
    /// Assigning the id the root already has is a no-op; any other id is
    /// rejected once one is set. Entities registered earlier see the id from
    /// this point on.
    pub fn assign_id(&mut self, id: AggregateId) -> Result<(), AggregateError> {
        let current = *self.id.get_or_init(|| id);
        if current != id {
            return Err(AggregateError::IdConflict {
                aggregate_type: A::aggregate_type(),
                current,
                attempted: id,
            });
        }
        Ok(())
    }

    /// Runs `hook` on every event this root authors from now on.
    pub fn attach_modifier(&mut self, hook: Arc<EventModifierHook>) {
        self.modifier = Some(hook);
    }

    pub fn has_modifier(&self) -> bool {
        self.modifier.is_some()
    }

    pub(crate) fn restore(
        &mut self,
        id: AggregateId,
        sequence: Sequence,
        entities: Vec<EntityId>,
    ) -> Result<(), AggregateError> {
        self.assign_id(id)?;
        self.last_event_sequence = sequence;
        self.entities = entities;
        Ok(())
    }

    pub(crate) fn record_entity(&mut self, entity_id: EntityId) -> bool {
        if self.is_registered(entity_id) {
            return false;
        }
        self.entities.push(entity_id);
        true
    }
}

/// Trait for event-sourced aggregates.
///
/// Implementors embed an [`AggregateRoot`] and expose it through
/// [`root`](Aggregate::root)/[`root_mut`](Aggregate::root_mut); everything
/// else has a default. State changes belong in
/// [`handle_event`](Aggregate::handle_event), which must be deterministic:
/// the same events in the same order always rebuild the same state.
pub trait Aggregate: Default + Send + Sync + Sized + 'static {
    /// The type of events this aggregate and its entities produce and consume.
    type Event: DomainEvent;

    /// The type of errors command validation can produce.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the aggregate type name.
    ///
    /// Used for event store organization and routing.
    fn aggregate_type() -> &'static str;

    fn root(&self) -> &AggregateRoot<Self>;

    fn root_mut(&mut self) -> &mut AggregateRoot<Self>;

    /// Default dispatch mechanism.
    ///
    /// Event kinds this aggregate does not care about should fall through
    /// without error.
    fn handle_event(&mut self, event: &EventRecord<Self::Event>) -> Result<(), ApplyError> {
        let _ = event;
        Ok(())
    }

    /// Looks up a child entity for entity-scoped dispatch.
    fn find_entity(&mut self, entity_id: EntityId) -> Option<&mut dyn EntityDispatch<Self::Event>> {
        let _ = entity_id;
        None
    }

    /// Snapshot capture and restore for this aggregate, if it supports it.
    ///
    /// Aggregates implementing [`SnapshotCapable`](crate::SnapshotCapable)
    /// return `Some(SnapshotSupport::new())`.
    fn snapshot_support() -> Option<SnapshotSupport<Self>> {
        None
    }

    fn id(&self) -> Option<AggregateId> {
        self.root().id()
    }

    fn last_event_sequence(&self) -> Sequence {
        self.root().last_event_sequence()
    }

    fn uncommitted_events(&self) -> &[EventRecord<Self::Event>] {
        self.root().uncommitted_events()
    }

    /// Authors a new root-scoped event and returns its sequence.
    ///
    /// The handler for the creation event is expected to assign the id; an
    /// event authored while the aggregate still has no id afterwards fails
    /// with [`AggregateError::IdNotAssigned`]. On any failure the sequence
    /// counter is restored and nothing is queued.
    fn apply(&mut self, event: Self::Event) -> Result<Sequence, AggregateError> {
        author(self, None, event)
    }

    /// Authors a new event scoped to a registered child entity.
    ///
    /// The root's handlers see the event first, then the entity's.
    fn apply_to_entity(
        &mut self,
        entity_id: EntityId,
        event: Self::Event,
    ) -> Result<Sequence, AggregateError> {
        if !self.root().is_registered(entity_id) {
            return Err(AggregateError::UnknownEntity {
                aggregate_type: Self::aggregate_type(),
                entity_id,
            });
        }
        author(self, Some(entity_id), event)
    }

    /// Rebuilds state from stored events.
    ///
    /// All events must belong to one aggregate (this one, if it already has
    /// an id) and carry distinct sequences; that is checked before anything
    /// is mutated. The id is taken from the stream when unset, the sequence
    /// counter advances to the highest sequence, then each event is
    /// dispatched in ascending sequence order. Nothing is queued and the
    /// event modifier does not run.
    fn apply_historical(&mut self, mut events: Vec<EventRecord<Self::Event>>) -> Result<(), AggregateError> {
        events.sort_by_key(|e| e.sequence());
        let (Some(first), Some(last)) = (events.first(), events.last()) else {
            return Ok(());
        };
        let stream_id = first.aggregate_root_id();
        let highest = last.sequence();

        if let Some(id) = self.id()
            && id != stream_id
        {
            return Err(AggregateError::ForeignEvent {
                aggregate_id: id,
                event_aggregate_id: stream_id,
            });
        }
        if let Some(foreign) = events.iter().find(|e| e.aggregate_root_id() != stream_id) {
            return Err(AggregateError::ForeignEvent {
                aggregate_id: stream_id,
                event_aggregate_id: foreign.aggregate_root_id(),
            });
        }
        if let Some(pair) = events.windows(2).find(|w| w[0].sequence() == w[1].sequence()) {
            return Err(AggregateError::DuplicateSequence {
                sequence: pair[0].sequence(),
            });
        }

        let root = self.root_mut();
        root.assign_id(stream_id)?;
        root.last_event_sequence = root.last_event_sequence.max(highest);

        for event in &events {
            dispatch_record(self, event, true)?;
        }
        tracing::trace!(
            aggregate_type = Self::aggregate_type(),
            aggregate_id = %stream_id,
            replayed = events.len(),
            "historical events applied"
        );
        Ok(())
    }

    /// Clears the uncommitted log after a successful save.
    fn commit_events(&mut self) {
        let committed = self.root().uncommitted.len();
        self.root_mut().uncommitted.clear();
        tracing::trace!(aggregate_type = Self::aggregate_type(), committed, "events committed");
    }

    /// Registers `entity` with this root and points it back at the root.
    ///
    /// Returns `false` when the entity was already registered. The root id
    /// may still be unassigned; the entity's `root_id()` follows it once set.
    fn register_entity<T>(&mut self, entity: &mut T) -> Result<bool, AggregateError>
    where
        T: Entity<Event = Self::Event>,
    {
        let slot = Arc::clone(&self.root().id);
        entity.entity_mut().attach(slot)?;
        Ok(self.root_mut().record_entity(entity.id()))
    }
}

fn author<A: Aggregate>(
    aggregate: &mut A,
    entity_id: Option<EntityId>,
    event: A::Event,
) -> Result<Sequence, AggregateError> {
    let previous = aggregate.last_event_sequence();
    let sequence = previous.next();

    // Until the creation handler has run there may be no id to put in the
    // header yet; handlers see a nil id in that case.
    let placeholder = aggregate
        .id()
        .unwrap_or_else(|| AggregateId::from_uuid(Uuid::nil()));
    let mut header = EventHeader::new(placeholder, sequence);
    header.entity_id = entity_id;
    let mut record = EventRecord::new(header, event);

    aggregate.root_mut().last_event_sequence = sequence;
    let stamped = dispatch_record(aggregate, &record, false).and_then(|()| {
        aggregate.id().ok_or(AggregateError::IdNotAssigned {
            aggregate_type: A::aggregate_type(),
        })
    });
    let id = match stamped {
        Ok(id) => id,
        Err(err) => {
            aggregate.root_mut().last_event_sequence = previous;
            return Err(err);
        }
    };

    let header = record.header_mut();
    header.aggregate_root_id = id;
    header.event_date = Utc::now();

    if let Some(hook) = aggregate.root().modifier.clone() {
        let (header, metadata) = record.parts_mut();
        hook.apply_modification(header, metadata);
    }

    tracing::trace!(
        aggregate_type = A::aggregate_type(),
        aggregate_id = %id,
        event_type = record.event_type(),
        %sequence,
        "event applied"
    );
    aggregate.root_mut().uncommitted.push(record);
    Ok(sequence)
}

/// Root first, then the entity the event is scoped to.
///
/// When replaying, an entity the aggregate no longer models is skipped so old
/// streams keep loading; when authoring it is an error.
fn dispatch_record<A: Aggregate>(
    aggregate: &mut A,
    record: &EventRecord<A::Event>,
    replaying: bool,
) -> Result<(), AggregateError> {
    let dispatcher = aggregate.root().dispatcher.clone();
    dispatcher.dispatch(aggregate, record, A::aggregate_type(), A::handle_event)?;

    let Some(entity_id) = record.entity_id() else {
        return Ok(());
    };
    match aggregate.find_entity(entity_id) {
        Some(entity) => entity.dispatch_event(record),
        None if replaying => {
            tracing::trace!(
                aggregate_type = A::aggregate_type(),
                %entity_id,
                event_type = record.event_type(),
                "no entity for replayed event, skipped"
            );
            Ok(())
        }
        None => Err(AggregateError::UnknownEntity {
            aggregate_type: A::aggregate_type(),
            entity_id,
        }),
    }
}
