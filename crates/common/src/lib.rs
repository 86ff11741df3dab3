//! Identifier types shared by the event store and the domain core.

mod types;

pub use types::{AggregateId, EntityId};
