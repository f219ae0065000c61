//! Read model builders fed with committed events.
//!
//! Projections are rebuildable from the event store and idempotent per
//! event, so applying the same committed event twice is harmless.

pub mod users;

pub use users::{UserReadModel, UsersProjection};

use crate::event_store::StoredEvent;

/// Consumer of committed events.
///
/// Projections run after the append succeeded; a failing projection never
/// undoes the write, it only leaves its read model stale.
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, event: &StoredEvent) -> anyhow::Result<()>;
}
