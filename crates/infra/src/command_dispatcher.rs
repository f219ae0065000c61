//! Command execution for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's stream
//!   ↓
//! 2. Rehydrate (fold historical events into a fresh aggregate)
//!   ↓
//! 3. Handle the command (pure decision, produces events)
//!   ↓
//! 4. Append with an exact expected version (optimistic concurrency)
//! ```
//!
//! Authorization happens before this point, in the command pipeline. The
//! dispatcher trusts its caller.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use stratus_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale aggregate version or an entity that already exists.
    #[error("conflict: {0}")]
    Concurrency(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// Historical payload no longer decodes into the aggregate's event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                DispatchError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
        }
    }
}

/// Reusable command execution engine over any [`EventStore`].
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: EventStore> CommandDispatcher<S> {
    /// Runs `command` against the current state of `aggregate_id` and returns
    /// the committed events. A command that decides no events commits nothing
    /// and returns an empty vector.
    ///
    /// A concurrent writer that appended in between surfaces as
    /// [`DispatchError::Concurrency`]; callers may reload and retry.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stratus_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.store.append(uncommitted, expected)?)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::CorruptStream(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::CorruptStream(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stratus_core::TenantId;
    use stratus_tenants::{
        AGGREGATE_TYPE, CreateTenant, Tenant, TenantCommand, UpdateTenant,
    };

    use crate::event_store::InMemoryEventStore;

    fn create(tenant_id: TenantId) -> TenantCommand {
        TenantCommand::Create(CreateTenant {
            tenant_id,
            name: "acme".to_string(),
            display_name: "Acme".to_string(),
            occurred_at: Utc::now(),
        })
    }

    fn dispatch(
        dispatcher: &CommandDispatcher<InMemoryEventStore>,
        cmd: &TenantCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let tenant_id = cmd.tenant_id();
        dispatcher.dispatch(tenant_id.into(), AGGREGATE_TYPE, cmd, |_| Tenant::empty(tenant_id))
    }

    #[test]
    fn rehydrates_before_handling() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let tenant_id = TenantId::new();
        dispatch(&dispatcher, &create(tenant_id)).unwrap();

        let update = TenantCommand::Update(UpdateTenant {
            tenant_id,
            display_name: "Acme Inc".to_string(),
            occurred_at: Utc::now(),
        });
        let committed = dispatch(&dispatcher, &update).unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 2);
        assert_eq!(committed[0].event_type, "tenant.updated");
    }

    #[test]
    fn duplicate_create_is_a_conflict() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let tenant_id = TenantId::new();
        dispatch(&dispatcher, &create(tenant_id)).unwrap();

        let err = dispatch(&dispatcher, &create(tenant_id)).unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));
    }

    #[test]
    fn no_op_commits_nothing() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let tenant_id = TenantId::new();
        dispatch(&dispatcher, &create(tenant_id)).unwrap();

        let same = TenantCommand::Update(UpdateTenant {
            tenant_id,
            display_name: "Acme".to_string(),
            occurred_at: Utc::now(),
        });
        assert!(dispatch(&dispatcher, &same).unwrap().is_empty());
        assert_eq!(dispatcher.store().load_stream(tenant_id.into()).unwrap().len(), 1);
    }

    #[test]
    fn missing_aggregate_maps_to_not_found() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let update = TenantCommand::Update(UpdateTenant {
            tenant_id: TenantId::new(),
            display_name: "Acme".to_string(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(dispatch(&dispatcher, &update), Err(DispatchError::NotFound)));
    }
}
