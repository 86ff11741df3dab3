//! Event-sourcing domain core.
//!
//! This crate provides:
//! - [`Aggregate`]/[`AggregateRoot`] and [`Entity`] for state rebuilt from events
//! - [`DomainEvent`] and [`EventRecord`] for the event model
//! - [`DomainRepository`] for loading (snapshot + replay) and saving
//!   (append, publish, commit, snapshot) aggregates
//! - [`DomainEventBus`] for in-process delivery of committed events
//! - [`EventModifierHook`] for enriching events as they are authored
//! - [`AggregateCommandHandler`] for the load/validate/handle/save cycle

pub mod aggregate;
pub mod bus;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod event;
pub mod modifier;
pub mod repository;
pub mod snapshot;
pub mod telemetry;

pub use aggregate::{Aggregate, AggregateRoot};
pub use bus::{
    BusError, DomainEventBus, EventHandler, EventSelector, HandlerError, HandlerType,
    PublishedEvent, ServiceRegistry, ServiceResolver,
};
pub use command::{AggregateCommandHandler, Command, CommandResult};
pub use config::DomainConfig;
pub use dispatch::{Dispatcher, EventRouter};
pub use entity::{AggregateEntity, Entity, EntityDispatch};
pub use error::{AggregateError, ApplyError, DomainError};
pub use event::{DomainEvent, EventHeader, EventMetadata, EventRecord};
pub use modifier::{EventModification, EventModifierHook};
pub use repository::DomainRepository;
pub use snapshot::{SnapshotCapable, SnapshotSupport};
pub use telemetry::init_tracing;
