//! Routing of events to the handlers that mutate aggregate and entity state.
//!
//! Every aggregate and entity has a default mechanism, its `handle_event`
//! method (normally a `match` over the event enum with a wildcard arm). A
//! [`Dispatcher`] can additionally carry a custom delegate, tried first; when
//! the delegate fails and fallback is enabled the default mechanism gets a
//! chance before the failure is reported.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AggregateError, ApplyError};
use crate::event::{DomainEvent, EventRecord};

/// Signature of a dispatch handler for targets of type `T`.
pub type DispatchFn<T, E> = dyn Fn(&mut T, &EventRecord<E>) -> Result<(), ApplyError> + Send + Sync;

/// Dispatch configuration of one aggregate or entity.
pub struct Dispatcher<T, E> {
    delegate: Option<Arc<DispatchFn<T, E>>>,
    fallback: bool,
}

impl<T, E> Default for Dispatcher<T, E> {
    fn default() -> Self {
        Self {
            delegate: None,
            fallback: false,
        }
    }
}

impl<T, E> Clone for Dispatcher<T, E> {
    fn clone(&self) -> Self {
        Self {
            delegate: self.delegate.clone(),
            fallback: self.fallback,
        }
    }
}

impl<T, E> std::fmt::Debug for Dispatcher<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("delegate", &self.delegate.is_some())
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl<T: 'static, E: DomainEvent> Dispatcher<T, E> {
    /// Dispatcher that only uses the default mechanism.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher that routes every event through `delegate` first.
    pub fn delegate<F>(delegate: F) -> Self
    where
        F: Fn(&mut T, &EventRecord<E>) -> Result<(), ApplyError> + Send + Sync + 'static,
    {
        Self {
            delegate: Some(Arc::new(delegate)),
            fallback: false,
        }
    }

    /// Whether a failing delegate falls back to the default mechanism.
    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn has_delegate(&self) -> bool {
        self.delegate.is_some()
    }

    pub fn falls_back(&self) -> bool {
        self.fallback
    }

    pub(crate) fn dispatch<F>(
        &self,
        target: &mut T,
        event: &EventRecord<E>,
        target_name: &'static str,
        default: F,
    ) -> Result<(), AggregateError>
    where
        F: FnOnce(&mut T, &EventRecord<E>) -> Result<(), ApplyError>,
    {
        let invocation = |cause, delegate_cause| AggregateError::Invocation {
            target: target_name,
            event_type: event.event_type(),
            sequence: event.sequence(),
            cause,
            delegate_cause,
        };

        let mut delegate_cause = None;
        if let Some(delegate) = &self.delegate {
            match delegate(target, event) {
                Ok(()) => return Ok(()),
                Err(cause) if !self.fallback => return Err(invocation(cause, None)),
                Err(cause) => {
                    tracing::debug!(
                        target_name,
                        event_type = event.event_type(),
                        error = %cause,
                        "delegate failed, falling back to default handler"
                    );
                    delegate_cause = Some(cause);
                }
            }
        }

        default(target, event).map_err(|cause| invocation(cause, delegate_cause))
    }
}

/// Explicit handler table keyed by event type name.
///
/// Event types without an entry are accepted without any state change, so
/// old streams keep replaying after an aggregate stops caring about an event.
pub struct EventRouter<T, E> {
    routes: HashMap<&'static str, Arc<DispatchFn<T, E>>>,
}

impl<T, E> Default for EventRouter<T, E> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }
}

impl<T: 'static, E: DomainEvent> EventRouter<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events whose `event_type()` is `event_type`.
    /// A later registration for the same name replaces the earlier one.
    pub fn on<F>(mut self, event_type: &'static str, handler: F) -> Self
    where
        F: Fn(&mut T, &EventRecord<E>) -> Result<(), ApplyError> + Send + Sync + 'static,
    {
        self.routes.insert(event_type, Arc::new(handler));
        self
    }

    pub fn handles(&self, event_type: &str) -> bool {
        self.routes.contains_key(event_type)
    }

    pub fn route(&self, target: &mut T, event: &EventRecord<E>) -> Result<(), ApplyError> {
        match self.routes.get(event.event_type()) {
            Some(handler) => handler(target, event),
            None => Ok(()),
        }
    }

    /// Turns the table into a delegate dispatcher.
    pub fn into_dispatcher(self) -> Dispatcher<T, E> {
        Dispatcher::delegate(move |target: &mut T, event: &EventRecord<E>| self.route(target, event))
    }
}
