//! Storage contracts consumed by the domain core.
//!
//! The core never talks to a database directly. It appends and reads
//! [`EventEnvelope`]s through [`EventStore`] and loads/saves [`Snapshot`]s
//! through [`SnapshotStore`]. The in-memory implementations here enforce the
//! `(aggregate_id, sequence)` uniqueness constraint that any durable backend
//! must also enforce.

pub mod error;
pub mod event;
pub mod memory;
pub mod snapshot;
pub mod store;

pub use common::{AggregateId, EntityId};
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Sequence};
pub use memory::{InMemoryEventStore, InMemorySnapshotStore};
pub use snapshot::Snapshot;
pub use store::{EventStore, EventStoreExt, SnapshotStore};
