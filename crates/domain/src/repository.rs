//! Loading and saving aggregates through the event and snapshot stores.

use std::sync::Arc;
use std::time::Instant;

use common::AggregateId;
use event_store::{EventStore, Sequence, SnapshotStore};

use crate::aggregate::Aggregate;
use crate::bus::DomainEventBus;
use crate::config::DomainConfig;
use crate::error::DomainError;
use crate::event::EventRecord;
use crate::modifier::{self, EventModifierHook};
use crate::snapshot::SnapshotSupport;

/// Event-sourced repository for aggregates of any type.
///
/// Loading restores the latest snapshot (for aggregates that support them)
/// and replays the events recorded after it. Saving appends the uncommitted
/// events, publishes them on the bus, commits them and takes a snapshot when
/// one is due.
pub struct DomainRepository<S, SS> {
    event_store: S,
    snapshot_store: SS,
    bus: Arc<DomainEventBus>,
    modifier: Option<Arc<EventModifierHook>>,
    config: DomainConfig,
}

impl<S: EventStore, SS: SnapshotStore> DomainRepository<S, SS> {
    pub fn new(event_store: S, snapshot_store: SS, bus: Arc<DomainEventBus>) -> Self {
        Self {
            event_store,
            snapshot_store,
            bus,
            modifier: None,
            config: DomainConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DomainConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches `hook` to every aggregate this repository creates or loads.
    pub fn with_event_modifier(mut self, hook: Arc<EventModifierHook>) -> Self {
        self.modifier = Some(hook);
        self
    }

    /// Attaches the process-wide hook, see [`modifier::global`].
    pub fn with_global_event_modifier(self) -> Self {
        self.with_event_modifier(modifier::global())
    }

    pub fn event_store(&self) -> &S {
        &self.event_store
    }

    pub fn snapshot_store(&self) -> &SS {
        &self.snapshot_store
    }

    pub fn bus(&self) -> &DomainEventBus {
        &self.bus
    }

    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    /// A fresh aggregate with the repository's event modifier attached.
    pub fn create<A: Aggregate>(&self) -> A {
        let mut aggregate = A::default();
        if let Some(hook) = &self.modifier {
            aggregate.root_mut().attach_modifier(Arc::clone(hook));
        }
        aggregate
    }

    /// Loads an aggregate by id.
    ///
    /// Returns `Ok(None)` for an unknown id, or
    /// [`DomainError::AggregateNotFound`] when `throw_on_not_found` is set.
    /// An aggregate counts as found only if events were replayed: a snapshot
    /// with no newer events reports not-found.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::aggregate_type()))]
    pub async fn get<A: Aggregate>(
        &self,
        aggregate_id: AggregateId,
        throw_on_not_found: bool,
    ) -> Result<Option<A>, DomainError> {
        let started = Instant::now();
        let mut aggregate = self.create::<A>();

        let support = self.snapshot_support::<A>();
        let snapshot = self.snapshot_store.get_snapshot(aggregate_id).await?;
        let start = match (&support, &snapshot) {
            (Some(_), Some(snapshot)) => snapshot.sequence,
            _ => Sequence::initial(),
        };

        let events = self
            .event_store
            .get_events(aggregate_id, start)
            .await?
            .into_iter()
            .map(EventRecord::<A::Event>::from_envelope)
            .collect::<Result<Vec<_>, _>>()?;
        let replayed = events.len();

        if !start.is_initial()
            && replayed > 0
            && let (Some(support), Some(snapshot)) = (support, snapshot)
        {
            support.restore(&mut aggregate, snapshot)?;
            tracing::debug!(%start, "restored from snapshot");
        }

        aggregate.apply_historical(events)?;

        if aggregate.last_event_sequence().is_initial() || replayed == 0 {
            tracing::debug!(%aggregate_id, "aggregate not found");
            if throw_on_not_found {
                return Err(DomainError::AggregateNotFound {
                    aggregate_type: A::aggregate_type(),
                    aggregate_id,
                });
            }
            return Ok(None);
        }

        metrics::counter!("aggregates_loaded_total").increment(1);
        metrics::histogram!("aggregate_replay_seconds").record(started.elapsed().as_secs_f64());
        tracing::debug!(
            %aggregate_id,
            replayed,
            sequence = %aggregate.last_event_sequence(),
            "aggregate loaded"
        );
        Ok(Some(aggregate))
    }

    /// Persists the aggregate's uncommitted events.
    ///
    /// Does nothing when there are none. Events are committed only after
    /// they were appended and published, so a failure leaves them pending.
    #[tracing::instrument(skip_all, fields(aggregate_type = A::aggregate_type(), aggregate_id = ?aggregate.id()))]
    pub async fn save<A: Aggregate>(&self, aggregate: &mut A) -> Result<(), DomainError> {
        if aggregate.uncommitted_events().is_empty() {
            tracing::trace!("no uncommitted events");
            return Ok(());
        }

        let envelopes = aggregate
            .uncommitted_events()
            .iter()
            .map(|event| event.to_envelope(A::aggregate_type()))
            .collect::<Result<Vec<_>, _>>()?;
        let count = envelopes.len();

        let last = self.event_store.append(envelopes).await?;
        metrics::counter!("domain_events_appended_total").increment(count as u64);
        tracing::info!(count, %last, "events appended");

        self.bus.publish_events(aggregate.uncommitted_events()).await?;
        aggregate.commit_events();

        if let Some(support) = self.snapshot_support::<A>() {
            self.snapshot_if_due(aggregate, support).await?;
        }
        Ok(())
    }

    async fn snapshot_if_due<A: Aggregate>(
        &self,
        aggregate: &A,
        support: SnapshotSupport<A>,
    ) -> Result<(), DomainError> {
        let Some(aggregate_id) = aggregate.id() else {
            return Ok(());
        };
        let previous = self.snapshot_store.get_snapshot(aggregate_id).await?;
        if !support.should_take(aggregate, previous.as_ref()) {
            return Ok(());
        }

        let snapshot = support.capture(aggregate)?;
        let sequence = snapshot.sequence;
        self.snapshot_store.save_snapshot(snapshot).await?;
        metrics::counter!("snapshots_saved_total").increment(1);
        tracing::info!(%aggregate_id, %sequence, "snapshot saved");
        Ok(())
    }

    fn snapshot_support<A: Aggregate>(&self) -> Option<SnapshotSupport<A>> {
        if self.config.snapshots_enabled {
            A::snapshot_support()
        } else {
            None
        }
    }
}

impl<S, SS> std::fmt::Debug for DomainRepository<S, SS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainRepository")
            .field("bus", &self.bus)
            .field("modifier", &self.modifier.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
