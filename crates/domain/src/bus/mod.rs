//! In-process delivery of committed domain events.
//!
//! Handler types are registered once, grouped by the [`EventSelector`] they
//! declare. Publishing an event walks every group whose selector matches and,
//! for each handler type in the group, resolves a fresh instance through the
//! [`ServiceResolver`] and awaits it. Delivery is sequential and stops at the
//! first failure.

mod handler;
mod resolver;

use std::sync::Arc;

use event_store::Sequence;
use thiserror::Error;

use crate::event::{DomainEvent, EventRecord};

pub use handler::{EventHandler, EventSelector, HandlerError, HandlerType, PublishedEvent};
pub use resolver::{ServiceRegistry, ServiceResolver};

/// Errors raised while delivering an event.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("no service registered for handler {handler}")]
    UnresolvedHandler { handler: &'static str },

    /// The resolver returned something that is not the handler type.
    #[error("service resolved for {handler} does not provide its handle method")]
    MissingHandlerMethod { handler: &'static str },

    #[error("handler {handler} failed on {event_type} (sequence {sequence}): {source}")]
    Handler {
        handler: &'static str,
        event_type: &'static str,
        sequence: Sequence,
        #[source]
        source: HandlerError,
    },
}

/// Handlers sharing one selector, in registration order.
struct Invoker {
    selector: EventSelector,
    handlers: Vec<HandlerType>,
}

/// Routes published events to the handlers subscribed to them.
pub struct DomainEventBus {
    invokers: Vec<Invoker>,
    resolver: Arc<dyn ServiceResolver>,
}

impl DomainEventBus {
    pub fn new(
        handler_types: impl IntoIterator<Item = HandlerType>,
        resolver: Arc<dyn ServiceResolver>,
    ) -> Self {
        let mut invokers: Vec<Invoker> = Vec::new();
        for handler_type in handler_types {
            let selector = handler_type.selector();
            match invokers.iter_mut().find(|i| i.selector == selector) {
                Some(invoker) => {
                    if invoker
                        .handlers
                        .iter()
                        .any(|h| h.type_id() == handler_type.type_id())
                    {
                        tracing::debug!(handler = handler_type.name(), "handler already registered");
                        continue;
                    }
                    invoker.handlers.push(handler_type);
                }
                None => invokers.push(Invoker {
                    selector,
                    handlers: vec![handler_type],
                }),
            }
        }
        Self { invokers, resolver }
    }

    /// A bus with no subscribers; publishing is a no-op.
    pub fn without_handlers() -> Self {
        Self::new(Vec::new(), Arc::new(ServiceRegistry::new()))
    }

    pub fn handler_count(&self) -> usize {
        self.invokers.iter().map(|i| i.handlers.len()).sum()
    }

    /// Handler types that would receive `event`, in delivery order.
    pub fn handlers_for<'a>(
        &'a self,
        event: &'a dyn PublishedEvent,
    ) -> impl Iterator<Item = &'a HandlerType> + 'a {
        self.invokers
            .iter()
            .filter(move |i| i.selector.matches(event))
            .flat_map(|i| i.handlers.iter())
    }

    /// Delivers one event to every subscribed handler.
    #[tracing::instrument(
        skip_all,
        fields(event_type = event.event_type(), sequence = %event.header().sequence)
    )]
    pub async fn publish(&self, event: &dyn PublishedEvent) -> Result<(), BusError> {
        let mut delivered = 0usize;
        for handler_type in self.handlers_for(event) {
            let handler = handler_type.resolve(self.resolver.as_ref())?;
            handler
                .handle(event)
                .await
                .map_err(|source| BusError::Handler {
                    handler: handler_type.name(),
                    event_type: event.event_type(),
                    sequence: event.header().sequence,
                    source,
                })?;
            delivered += 1;
        }

        metrics::counter!("domain_events_published_total").increment(1);
        tracing::debug!(delivered, "event published");
        Ok(())
    }

    /// Publishes `events` in order, stopping at the first failure.
    pub async fn publish_events<E: DomainEvent>(&self, events: &[EventRecord<E>]) -> Result<(), BusError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

impl Default for DomainEventBus {
    fn default() -> Self {
        Self::without_handlers()
    }
}

impl std::fmt::Debug for DomainEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for invoker in &self.invokers {
            let names: Vec<_> = invoker.handlers.iter().map(HandlerType::name).collect();
            map.entry(&invoker.selector.to_string(), &names);
        }
        map.finish()
    }
}
