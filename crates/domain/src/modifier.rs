//! Hook for enriching events at authoring time.
//!
//! A hook holds at most one [`EventModification`]. Aggregates that have a hook
//! attached run it on every event they author, after the event has been
//! sequenced and stamped and right before it is queued. Replayed events never
//! pass through the hook: enrichment happens exactly once.

use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use crate::event::{EventHeader, EventMetadata};

/// Cross-cutting enrichment applied to authored events.
pub trait EventModification: Send + Sync {
    fn modify(&self, header: &EventHeader, metadata: &mut EventMetadata);
}

impl<F> EventModification for F
where
    F: Fn(&EventHeader, &mut EventMetadata) + Send + Sync,
{
    fn modify(&self, header: &EventHeader, metadata: &mut EventMetadata) {
        self(header, metadata)
    }
}

/// Swappable holder for the active event modification.
///
/// Swaps are synchronised, so a modification may be replaced while
/// aggregates are authoring events on other tasks.
#[derive(Default)]
pub struct EventModifierHook {
    current: RwLock<Option<Arc<dyn EventModification>>>,
}

impl EventModifierHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates `modification`, dropping whichever one was active.
    pub fn enable(&self, modification: impl EventModification + 'static) {
        self.replace(modification);
    }

    /// Activates `modification` and returns the one it displaced.
    pub fn replace(
        &self,
        modification: impl EventModification + 'static,
    ) -> Option<Arc<dyn EventModification>> {
        let modification: Arc<dyn EventModification> = Arc::new(modification);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.replace(modification)
    }

    /// Deactivates the current modification, if any.
    pub fn remove(&self) -> Option<Arc<dyn EventModification>> {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_enabled(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn apply_modification(&self, header: &EventHeader, metadata: &mut EventMetadata) {
        // Clone the Arc so the lock is not held while user code runs.
        let modification = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(modification) = modification {
            modification.modify(header, metadata);
        }
    }
}

impl std::fmt::Debug for EventModifierHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventModifierHook")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

static GLOBAL: LazyLock<Arc<EventModifierHook>> =
    LazyLock::new(|| Arc::new(EventModifierHook::new()));

/// The process-wide hook.
///
/// Intended to be configured once at startup, before any aggregate is
/// created. Repositories only use it when built with
/// [`DomainRepository::with_global_event_modifier`](crate::DomainRepository::with_global_event_modifier).
pub fn global() -> Arc<EventModifierHook> {
    Arc::clone(&GLOBAL)
}
