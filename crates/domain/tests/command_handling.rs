//! Integration tests for the command handling cycle.

mod fixtures;

use std::sync::Arc;

use common::{AggregateId, EntityId};
use domain::{
    Aggregate, AggregateCommandHandler, AggregateError, Command, DomainConfig, DomainError,
    DomainEventBus, DomainRepository, HandlerType, ServiceRegistry,
};
use event_store::{EventStoreExt, InMemoryEventStore, InMemorySnapshotStore, Sequence};
use fixtures::{
    AddLine, ChangeQuantity, CreateOrder, FailingEventStore, Journal, Order, OrderError,
    OrderEvent, ShipOrder, ShipmentNotifier, entries,
};

fn handler(
    events: &InMemoryEventStore,
    journal: &Journal,
) -> AggregateCommandHandler<InMemoryEventStore, InMemorySnapshotStore> {
    let mut services = ServiceRegistry::new();
    let journal = journal.clone();
    services.register(move || ShipmentNotifier {
        journal: journal.clone(),
    });
    let bus = DomainEventBus::new([HandlerType::of::<ShipmentNotifier>()], Arc::new(services));
    let repository = DomainRepository::new(events.clone(), InMemorySnapshotStore::new(), Arc::new(bus));
    AggregateCommandHandler::new(Arc::new(repository))
}

async fn created(
    handler: &AggregateCommandHandler<InMemoryEventStore, InMemorySnapshotStore>,
) -> AggregateId {
    let order_id = AggregateId::new();
    let result = handler
        .execute(CreateOrder {
            order_id,
            total: 1200,
        })
        .await
        .unwrap();
    assert!(result.is_success(), "create failed: {:?}", result.error);
    order_id
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn create_add_and_ship() {
        let events = InMemoryEventStore::new();
        let journal = Journal::default();
        let handler = handler(&events, &journal);
        let order_id = created(&handler).await;
        let line_id = EntityId::new();

        let result = handler
            .execute(AddLine {
                order_id,
                line_id,
                sku: "SKU-7".to_string(),
                quantity: 2,
            })
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].sequence(), Sequence::new(2));

        let result = handler
            .execute(ChangeQuantity {
                order_id,
                line_id,
                quantity: 5,
            })
            .await
            .unwrap();
        assert_eq!(result.events[0].entity_id(), Some(line_id));

        let result = handler.execute(ShipOrder { order_id }).await.unwrap();
        let order = result.into_result().unwrap();

        assert!(order.shipped);
        assert_eq!(order.line(line_id).unwrap().quantity, 5);
        assert_eq!(order.last_event_sequence(), Sequence::new(4));
        assert!(order.uncommitted_events().is_empty());
        assert_eq!(events.get_all_events(order_id).await.unwrap().len(), 4);
        assert_eq!(entries(&journal), vec![format!("shipped:{order_id}")]);
    }

    #[tokio::test]
    async fn create_result_carries_the_new_events() {
        let events = InMemoryEventStore::new();
        let handler = handler(&events, &Journal::default());
        let order_id = AggregateId::new();

        let result = handler
            .execute(CreateOrder {
                order_id,
                total: 10,
            })
            .await
            .unwrap();

        assert_eq!(result.aggregate_id, order_id);
        assert_eq!(
            result.events[0].payload(),
            &OrderEvent::OrderCreated {
                order_id,
                total: 10
            }
        );
        assert_eq!(result.aggregate.as_ref().and_then(|o| o.id()), Some(order_id));
    }
}

mod rejections {
    use super::*;

    #[tokio::test]
    async fn validation_failure_is_a_failed_result() {
        let events = InMemoryEventStore::new();
        let handler = handler(&events, &Journal::default());
        let order_id = created(&handler).await;
        let appends = events.append_calls();

        let result = handler
            .execute(CreateOrder {
                order_id,
                total: 1,
            })
            .await
            .unwrap();

        assert!(result.is_failure());
        let Some(DomainError::Rejected {
            command_type,
            reason,
        }) = &result.error
        else {
            panic!("expected rejection, got {:?}", result.error);
        };
        assert_eq!(*command_type, "CreateOrder");
        assert!(reason.downcast_ref::<OrderError>().is_some());
        assert!(result.aggregate.is_some());
        assert!(result.events.is_empty());
        assert_eq!(events.append_calls(), appends);
    }

    #[tokio::test]
    async fn command_for_unknown_order_is_rejected_by_validation() {
        let events = InMemoryEventStore::new();
        let handler = handler(&events, &Journal::default());

        let result = handler
            .execute(ShipOrder {
                order_id: AggregateId::new(),
            })
            .await
            .unwrap();

        assert!(matches!(result.error, Some(DomainError::Rejected { .. })));
        assert!(result.aggregate.is_none());
    }

    #[tokio::test]
    async fn strict_handler_reports_not_found() {
        let events = InMemoryEventStore::new();
        let handler = handler(&events, &Journal::default()).strict(true);

        let result = handler
            .execute(CreateOrder {
                order_id: AggregateId::new(),
                total: 1,
            })
            .await
            .unwrap();

        assert!(result.error.as_ref().is_some_and(DomainError::is_not_found));
        assert_eq!(events.append_calls(), 0);
    }

    #[tokio::test]
    async fn strictness_defaults_from_config() {
        let repository = DomainRepository::new(
            InMemoryEventStore::new(),
            InMemorySnapshotStore::new(),
            Arc::new(DomainEventBus::without_handlers()),
        )
        .with_config(DomainConfig {
            strict_not_found: true,
            ..DomainConfig::default()
        });
        let handler = AggregateCommandHandler::new(Arc::new(repository));

        let result = handler
            .execute(CreateOrder {
                order_id: AggregateId::new(),
                total: 1,
            })
            .await
            .unwrap();

        assert!(result.error.as_ref().is_some_and(DomainError::is_not_found));
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn persistence_failure_is_a_failed_result() {
        let repository = DomainRepository::new(
            FailingEventStore::default(),
            InMemorySnapshotStore::new(),
            Arc::new(DomainEventBus::without_handlers()),
        );
        let handler = AggregateCommandHandler::new(Arc::new(repository));
        let order_id = AggregateId::new();

        let result = handler
            .execute(CreateOrder {
                order_id,
                total: 1,
            })
            .await
            .unwrap();

        assert!(matches!(result.error, Some(DomainError::EventStore(_))));
        assert_eq!(result.events.len(), 1);
        let order = result.aggregate.unwrap();
        assert_eq!(order.uncommitted_events().len(), 1);
    }

    #[derive(Debug)]
    struct TouchMissingLine {
        order_id: AggregateId,
    }

    impl Command for TouchMissingLine {
        type Aggregate = Order;

        fn aggregate_id(&self) -> AggregateId {
            self.order_id
        }

        fn command_type(&self) -> &'static str {
            "TouchMissingLine"
        }

        fn handle(&self, order: &mut Order) -> Result<(), AggregateError> {
            order.apply_to_entity(EntityId::new(), OrderEvent::LineQuantityChanged { quantity: 1 })?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn aggregate_wiring_errors_propagate() {
        let events = InMemoryEventStore::new();
        let handler = handler(&events, &Journal::default());
        let order_id = created(&handler).await;

        let err = handler
            .execute(TouchMissingLine { order_id })
            .await
            .unwrap_err();

        assert!(err.is_programming_error());
        assert!(matches!(
            err,
            DomainError::Aggregate(AggregateError::UnknownEntity { aggregate_type: "Order", .. })
        ));
        assert_eq!(events.append_calls(), 1);
    }
}

mod snapshot_gap {
    use super::*;

    #[tokio::test]
    async fn order_looks_new_right_after_a_snapshotting_save() {
        let events = InMemoryEventStore::new();
        let handler = handler(&events, &Journal::default());
        let order_id = created(&handler).await;
        for quantity in 1..=4 {
            let result = handler
                .execute(AddLine {
                    order_id,
                    line_id: EntityId::new(),
                    sku: format!("SKU-{quantity}"),
                    quantity,
                })
                .await
                .unwrap();
            assert!(result.is_success());
        }

        let shipped = handler.execute(ShipOrder { order_id }).await.unwrap();
        assert!(matches!(shipped.error, Some(DomainError::Rejected { .. })));
        assert!(shipped.aggregate.is_none());

        let recreated = handler
            .execute(CreateOrder {
                order_id,
                total: 1,
            })
            .await
            .unwrap();
        assert!(matches!(recreated.error, Some(DomainError::EventStore(_))));
        assert_eq!(events.get_all_events(order_id).await.unwrap().len(), 5);
    }
}
