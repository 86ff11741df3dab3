//! Command handling infrastructure.

use std::fmt::Debug;
use std::sync::Arc;

use common::AggregateId;
use event_store::{EventStore, SnapshotStore};

use crate::aggregate::Aggregate;
use crate::error::{AggregateError, DomainError};
use crate::event::EventRecord;
use crate::repository::DomainRepository;

/// Trait for commands that can be executed against an aggregate.
///
/// Commands represent an intention to perform an action. They may be rejected
/// if the aggregate's current state doesn't allow the action.
pub trait Command: Send + Sync + Debug {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    /// Returns the ID of the aggregate this command targets.
    fn aggregate_id(&self) -> AggregateId;

    fn command_type(&self) -> &'static str;

    /// Business validation against the current state; `None` when the
    /// aggregate does not exist yet.
    fn validate(
        &self,
        aggregate: Option<&Self::Aggregate>,
    ) -> Result<(), <Self::Aggregate as Aggregate>::Error> {
        let _ = aggregate;
        Ok(())
    }

    /// Applies the command's events to the aggregate.
    fn handle(&self, aggregate: &mut Self::Aggregate) -> Result<(), AggregateError>;
}

/// Outcome of one command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    pub aggregate_id: AggregateId,

    /// The aggregate after the command, when it got far enough to have one.
    pub aggregate: Option<A>,

    /// The events the command applied, whether or not they were saved.
    pub events: Vec<EventRecord<A::Event>>,

    /// Why the command failed; `None` on success.
    pub error: Option<DomainError>,
}

impl<A: Aggregate> CommandResult<A> {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Converts into a plain `Result`, dropping the partial state on failure.
    pub fn into_result(self) -> Result<A, DomainError> {
        match (self.error, self.aggregate) {
            (Some(err), _) => Err(err),
            (None, Some(aggregate)) => Ok(aggregate),
            (None, None) => Err(DomainError::AggregateNotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: self.aggregate_id,
            }),
        }
    }
}

/// Executes commands against aggregates loaded through a [`DomainRepository`].
///
/// The handler is responsible for:
/// 1. Loading the target aggregate
/// 2. Validating the command against it
/// 3. Creating the aggregate when it does not exist yet
/// 4. Letting the command apply its events
/// 5. Saving (append, publish, commit, snapshot)
///
/// Storage, delivery and validation failures are reported through
/// [`CommandResult::error`]. Aggregate wiring defects (an event handler
/// failing, an event authored before the id is known) are returned as `Err`.
pub struct AggregateCommandHandler<S, SS> {
    repository: Arc<DomainRepository<S, SS>>,
    strict: bool,
}

impl<S: EventStore, SS: SnapshotStore> AggregateCommandHandler<S, SS> {
    /// Creates a handler; not-found strictness comes from the repository config.
    pub fn new(repository: Arc<DomainRepository<S, SS>>) -> Self {
        let strict = repository.config().strict_not_found;
        Self { repository, strict }
    }

    /// In strict mode a command for an unknown id fails instead of creating
    /// the aggregate.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn repository(&self) -> &DomainRepository<S, SS> {
        &self.repository
    }

    #[tracing::instrument(
        skip(self, command),
        fields(command_type = command.command_type(), aggregate_id = %command.aggregate_id())
    )]
    pub async fn execute<C: Command>(
        &self,
        command: C,
    ) -> Result<CommandResult<C::Aggregate>, DomainError> {
        metrics::counter!("commands_executed_total").increment(1);
        let aggregate_id = command.aggregate_id();

        let loaded = match self
            .repository
            .get::<C::Aggregate>(aggregate_id, self.strict)
            .await
        {
            Ok(loaded) => loaded,
            Err(err) if err.is_programming_error() => return Err(err),
            Err(err) => return Ok(failed(aggregate_id, None, Vec::new(), err)),
        };

        if let Err(reason) = command.validate(loaded.as_ref()) {
            tracing::info!(%reason, "command rejected");
            let err = DomainError::Rejected {
                command_type: command.command_type(),
                reason: Box::new(reason),
            };
            return Ok(failed(aggregate_id, loaded, Vec::new(), err));
        }

        let mut aggregate = match loaded {
            Some(aggregate) => aggregate,
            None => {
                let mut aggregate = self.repository.create::<C::Aggregate>();
                aggregate.root_mut().assign_id(aggregate_id)?;
                aggregate
            }
        };

        command.handle(&mut aggregate)?;
        let events = aggregate.uncommitted_events().to_vec();

        if let Err(err) = self.repository.save(&mut aggregate).await {
            tracing::warn!(error = %err, "saving aggregate failed");
            return Ok(failed(aggregate_id, Some(aggregate), events, err));
        }

        tracing::debug!(events = events.len(), "command executed");
        Ok(CommandResult {
            aggregate_id,
            aggregate: Some(aggregate),
            events,
            error: None,
        })
    }
}

fn failed<A: Aggregate>(
    aggregate_id: AggregateId,
    aggregate: Option<A>,
    events: Vec<EventRecord<A::Event>>,
    error: DomainError,
) -> CommandResult<A> {
    metrics::counter!("commands_failed_total").increment(1);
    CommandResult {
        aggregate_id,
        aggregate,
        events,
        error: Some(error),
    }
}
