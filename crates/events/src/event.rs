use chrono::{DateTime, Utc};

/// A fact recorded in an aggregate's stream.
///
/// Events are immutable, versioned for schema evolution, and only ever
/// appended.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable type tag (e.g. "user.role_binding.created").
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    fn occurred_at(&self) -> DateTime<Utc>;
}
