//! Event-sourced aggregate contracts.

use crate::error::{DomainError, DomainResult};

/// Identity and revision of a control-plane aggregate (user, tenant, cluster).
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events folded into this instance so far.
    fn version(&self) -> u64;
}

/// Stream revision the writer expects to find when appending.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Append regardless of the current revision.
    Any,
    /// Append only if the stream is exactly at this revision.
    Exact(u64),
    /// Append only to a stream that has no events yet.
    NoStream,
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
            ExpectedVersion::NoStream => actual == 0,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "stream revision mismatch (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

/// Decision/evolution pair for an event-sourced aggregate.
///
/// `handle` decides which events a command produces from the current state and
/// must not mutate. `apply` folds one event into the state and bumps the
/// version by one. Neither performs IO.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
