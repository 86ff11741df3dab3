//! Order domain shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{AggregateId, EntityId};
use domain::{
    Aggregate, AggregateEntity, AggregateError, AggregateRoot, ApplyError, Command, DomainEvent,
    EntityDispatch, Entity, EventHandler, EventRecord, EventRouter, EventSelector, HandlerError,
    PublishedEvent, SnapshotCapable, SnapshotSupport,
};
use event_store::{
    EventEnvelope, EventStore, EventStoreError, InMemoryEventStore, Sequence,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderCreated { order_id: AggregateId, total: i64 },
    LineAdded { line_id: EntityId, sku: String, quantity: u32 },
    LineQuantityChanged { quantity: u32 },
    OrderShipped,
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated { .. } => "OrderCreated",
            OrderEvent::LineAdded { .. } => "LineAdded",
            OrderEvent::LineQuantityChanged { .. } => "LineQuantityChanged",
            OrderEvent::OrderShipped => "OrderShipped",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order already exists")]
    AlreadyExists,

    #[error("order does not exist")]
    NotFound,

    #[error("order already shipped")]
    AlreadyShipped,
}

#[derive(Debug)]
pub struct OrderLine {
    entity: AggregateEntity<OrderLine>,
    pub sku: String,
    pub quantity: u32,
}

impl OrderLine {
    fn new(id: EntityId, sku: &str, quantity: u32) -> Self {
        Self {
            entity: AggregateEntity::new(id),
            sku: sku.to_string(),
            quantity,
        }
    }
}

impl Entity for OrderLine {
    type Event = OrderEvent;

    fn entity_type() -> &'static str {
        "OrderLine"
    }

    fn entity(&self) -> &AggregateEntity<Self> {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut AggregateEntity<Self> {
        &mut self.entity
    }

    fn handle_event(&mut self, event: &EventRecord<OrderEvent>) -> Result<(), ApplyError> {
        if let OrderEvent::LineQuantityChanged { quantity } = event.payload() {
            self.quantity = *quantity;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Order {
    root: AggregateRoot<Order>,
    pub total: i64,
    pub shipped: bool,
    pub lines: Vec<OrderLine>,
}

impl Order {
    pub fn line(&self, id: EntityId) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.id() == id)
    }
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn root(&self) -> &AggregateRoot<Self> {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot<Self> {
        &mut self.root
    }

    fn handle_event(&mut self, event: &EventRecord<OrderEvent>) -> Result<(), ApplyError> {
        match event.payload() {
            OrderEvent::OrderCreated { order_id, total } => {
                self.root.assign_id(*order_id)?;
                self.total = *total;
            }
            OrderEvent::LineAdded {
                line_id,
                sku,
                quantity,
            } => {
                if self.line(*line_id).is_none() {
                    let mut line = OrderLine::new(*line_id, sku, *quantity);
                    self.register_entity(&mut line)?;
                    self.lines.push(line);
                }
            }
            OrderEvent::OrderShipped => self.shipped = true,
            OrderEvent::LineQuantityChanged { .. } => {}
        }
        Ok(())
    }

    fn find_entity(&mut self, entity_id: EntityId) -> Option<&mut dyn EntityDispatch<OrderEvent>> {
        self.lines
            .iter_mut()
            .find(|l| l.id() == entity_id)
            .map(|l| l as &mut dyn EntityDispatch<OrderEvent>)
    }

    fn snapshot_support() -> Option<SnapshotSupport<Self>> {
        Some(SnapshotSupport::new())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderSnapshot {
    total: i64,
    shipped: bool,
    lines: Vec<(EntityId, String, u32)>,
}

impl SnapshotCapable for Order {
    type State = OrderSnapshot;

    fn capture_state(&self) -> OrderSnapshot {
        OrderSnapshot {
            total: self.total,
            shipped: self.shipped,
            lines: self
                .lines
                .iter()
                .map(|l| (l.id(), l.sku.clone(), l.quantity))
                .collect(),
        }
    }

    fn restore_state(&mut self, state: OrderSnapshot) -> Result<(), ApplyError> {
        self.total = state.total;
        self.shipped = state.shipped;
        for (id, sku, quantity) in state.lines {
            let mut line = OrderLine::new(id, &sku, quantity);
            self.register_entity(&mut line)?;
            self.lines.push(line);
        }
        Ok(())
    }

    fn snapshot_interval() -> i64 {
        5
    }
}

/// Same stream as [`Order`], but its router sends `OrderShipped` to a
/// handler that only accepts `OrderCreated`.
#[derive(Debug)]
pub struct MisroutedOrder {
    root: AggregateRoot<MisroutedOrder>,
}

impl Default for MisroutedOrder {
    fn default() -> Self {
        let router = EventRouter::new()
            .on("OrderCreated", |order: &mut MisroutedOrder, event: &EventRecord<OrderEvent>| {
                match event.payload() {
                    OrderEvent::OrderCreated { order_id, .. } => {
                        order.root.assign_id(*order_id)?;
                        Ok(())
                    }
                    other => Err(ApplyError::mismatch("OrderCreated", other)),
                }
            })
            .on("OrderShipped", |_: &mut MisroutedOrder, event: &EventRecord<OrderEvent>| {
                match event.payload() {
                    OrderEvent::OrderCreated { .. } => Ok(()),
                    other => Err(ApplyError::mismatch("OrderCreated", other)),
                }
            });
        Self {
            root: AggregateRoot::with_dispatcher(router.into_dispatcher()),
        }
    }
}

impl Aggregate for MisroutedOrder {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn root(&self) -> &AggregateRoot<Self> {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot<Self> {
        &mut self.root
    }
}

// Commands

#[derive(Debug)]
pub struct CreateOrder {
    pub order_id: AggregateId,
    pub total: i64,
}

impl Command for CreateOrder {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }

    fn command_type(&self) -> &'static str {
        "CreateOrder"
    }

    fn validate(&self, order: Option<&Order>) -> Result<(), OrderError> {
        match order {
            Some(_) => Err(OrderError::AlreadyExists),
            None => Ok(()),
        }
    }

    fn handle(&self, order: &mut Order) -> Result<(), AggregateError> {
        order.apply(OrderEvent::OrderCreated {
            order_id: self.order_id,
            total: self.total,
        })?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct AddLine {
    pub order_id: AggregateId,
    pub line_id: EntityId,
    pub sku: String,
    pub quantity: u32,
}

impl Command for AddLine {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }

    fn command_type(&self) -> &'static str {
        "AddLine"
    }

    fn validate(&self, order: Option<&Order>) -> Result<(), OrderError> {
        let order = order.ok_or(OrderError::NotFound)?;
        if order.shipped {
            return Err(OrderError::AlreadyShipped);
        }
        Ok(())
    }

    fn handle(&self, order: &mut Order) -> Result<(), AggregateError> {
        order.apply(OrderEvent::LineAdded {
            line_id: self.line_id,
            sku: self.sku.clone(),
            quantity: self.quantity,
        })?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ChangeQuantity {
    pub order_id: AggregateId,
    pub line_id: EntityId,
    pub quantity: u32,
}

impl Command for ChangeQuantity {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }

    fn command_type(&self) -> &'static str {
        "ChangeQuantity"
    }

    fn validate(&self, order: Option<&Order>) -> Result<(), OrderError> {
        order.map(|_| ()).ok_or(OrderError::NotFound)
    }

    fn handle(&self, order: &mut Order) -> Result<(), AggregateError> {
        order.apply_to_entity(
            self.line_id,
            OrderEvent::LineQuantityChanged {
                quantity: self.quantity,
            },
        )?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ShipOrder {
    pub order_id: AggregateId,
}

impl Command for ShipOrder {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }

    fn command_type(&self) -> &'static str {
        "ShipOrder"
    }

    fn validate(&self, order: Option<&Order>) -> Result<(), OrderError> {
        match order {
            None => Err(OrderError::NotFound),
            Some(order) if order.shipped => Err(OrderError::AlreadyShipped),
            Some(_) => Ok(()),
        }
    }

    fn handle(&self, order: &mut Order) -> Result<(), AggregateError> {
        order.apply(OrderEvent::OrderShipped)?;
        Ok(())
    }
}

// Bus handlers

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Records every order event as `"<type>#<sequence>"`.
pub struct OrderJournal {
    pub journal: Journal,
}

#[async_trait]
impl EventHandler for OrderJournal {
    fn selector() -> EventSelector {
        EventSelector::family::<OrderEvent>()
    }

    async fn handle(&self, event: &dyn PublishedEvent) -> Result<(), HandlerError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}#{}", event.event_type(), event.header().sequence));
        Ok(())
    }
}

/// Records the ids of shipped orders.
pub struct ShipmentNotifier {
    pub journal: Journal,
}

#[async_trait]
impl EventHandler for ShipmentNotifier {
    fn selector() -> EventSelector {
        EventSelector::kind::<OrderEvent>("OrderShipped")
    }

    async fn handle(&self, event: &dyn PublishedEvent) -> Result<(), HandlerError> {
        let record = event
            .downcast::<OrderEvent>()
            .ok_or_else(|| HandlerError::new("not an order event"))?;
        self.journal
            .lock()
            .unwrap()
            .push(format!("shipped:{}", record.aggregate_root_id()));
        Ok(())
    }
}

/// Always fails.
pub struct BrokenProjection;

#[async_trait]
impl EventHandler for BrokenProjection {
    fn selector() -> EventSelector {
        EventSelector::All
    }

    async fn handle(&self, _event: &dyn PublishedEvent) -> Result<(), HandlerError> {
        Err(HandlerError::new("projection offline"))
    }
}

/// Event store whose appends always fail.
#[derive(Clone, Default)]
pub struct FailingEventStore {
    inner: InMemoryEventStore,
}

#[async_trait]
impl EventStore for FailingEventStore {
    async fn get_events(
        &self,
        aggregate_id: AggregateId,
        after: Sequence,
    ) -> event_store::Result<Vec<EventEnvelope>> {
        self.inner.get_events(aggregate_id, after).await
    }

    async fn append(&self, _events: Vec<EventEnvelope>) -> event_store::Result<Sequence> {
        Err(EventStoreError::Backend("connection reset".to_string()))
    }

    async fn current_sequence(&self, aggregate_id: AggregateId) -> event_store::Result<Option<Sequence>> {
        self.inner.current_sequence(aggregate_id).await
    }
}

/// A created order with two lines, not yet saved.
pub fn new_order(total: i64) -> (Order, EntityId, EntityId) {
    let mut order = Order::default();
    let (first, second) = (EntityId::new(), EntityId::new());
    order
        .apply(OrderEvent::OrderCreated {
            order_id: AggregateId::new(),
            total,
        })
        .unwrap();
    for (line_id, sku) in [(first, "SKU-1"), (second, "SKU-2")] {
        order
            .apply(OrderEvent::LineAdded {
                line_id,
                sku: sku.to_string(),
                quantity: 1,
            })
            .unwrap();
    }
    (order, first, second)
}
