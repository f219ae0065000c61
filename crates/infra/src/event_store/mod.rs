//! Append-only event store boundary.
//!
//! One stream per aggregate instance, keyed by aggregate id. The control
//! plane only ships the in-memory store; durable backends implement the same
//! trait.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
