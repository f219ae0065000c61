//! User directory read model.
//!
//! Keeps one record per live user, including the role bindings the
//! authorization pipeline evaluates. This projection is also the
//! [`ReadOnlyUserRepository`] the pipeline resolves principals against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stratus_auth::UserRoleBinding;
use stratus_core::UserId;
use stratus_users::{AGGREGATE_TYPE, UserEvent};

use crate::event_store::StoredEvent;
use crate::projections::Projection;
use crate::read_model::ReadModelStore;
use crate::repository::{ReadOnlyUserRepository, RepositoryError};

// ─────────────────────────────────────────────────────────────────────────────
// Read Model
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReadModel {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    pub role_bindings: Vec<UserRoleBinding>,
    /// Sequence number of the last event folded into this record.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserReadModel {
    pub fn roles(&self) -> &[UserRoleBinding] {
        &self.role_bindings
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Projection
// ─────────────────────────────────────────────────────────────────────────────

pub struct UsersProjection<S> {
    store: S,
}

impl<S> UsersProjection<S>
where
    S: ReadModelStore<UserId, UserReadModel>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get(&self, user_id: &UserId) -> Option<UserReadModel> {
        self.store.get(user_id)
    }

    pub fn list(&self) -> Vec<UserReadModel> {
        self.store.list()
    }

    /// Looks a user up by e-mail, ignoring case and surrounding whitespace.
    /// When several live users share an address the oldest one wins.
    pub fn get_by_email(&self, email: &str) -> Option<UserReadModel> {
        let normalized = email.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        self.list()
            .into_iter()
            .filter(|u| u.email == normalized)
            .min_by_key(|u| (u.created_at, u.user_id))
    }

    fn apply_event(&self, stored: &StoredEvent, event: UserEvent) {
        let user_id = UserId::from(stored.aggregate_id);
        let occurred_at = stored.occurred_at;

        if let UserEvent::Created(e) = event {
            if self.store.get(&user_id).is_none() {
                self.store.upsert(
                    user_id,
                    UserReadModel {
                        user_id,
                        email: e.email,
                        name: e.name,
                        role_bindings: Vec::new(),
                        version: stored.sequence_number,
                        created_at: occurred_at,
                        updated_at: occurred_at,
                    },
                );
            }
            return;
        }

        let Some(mut model) = self.store.get(&user_id) else {
            return;
        };
        if stored.sequence_number <= model.version {
            return;
        }

        match event {
            UserEvent::Created(_) => {}
            UserEvent::Deleted(_) => {
                self.store.remove(&user_id);
                return;
            }
            UserEvent::Updated(e) => model.name = e.name,
            UserEvent::RoleBindingCreated(e) => model.role_bindings.push(e.binding),
            UserEvent::RoleBindingDeleted(e) => {
                model.role_bindings.retain(|b| b.id != e.binding_id)
            }
        }
        model.version = stored.sequence_number;
        model.updated_at = occurred_at;
        self.store.upsert(user_id, model);
    }
}

impl<S> Projection for UsersProjection<S>
where
    S: ReadModelStore<UserId, UserReadModel>,
{
    fn name(&self) -> &'static str {
        "users"
    }

    fn apply(&self, event: &StoredEvent) -> anyhow::Result<()> {
        if event.aggregate_type != AGGREGATE_TYPE {
            return Ok(());
        }
        let decoded: UserEvent = serde_json::from_value(event.payload.clone())?;
        self.apply_event(event, decoded);
        Ok(())
    }
}

#[async_trait]
impl<S> ReadOnlyUserRepository for UsersProjection<S>
where
    S: ReadModelStore<UserId, UserReadModel>,
{
    async fn by_email(&self, email: &str) -> Result<UserReadModel, RepositoryError> {
        self.get_by_email(email).ok_or(RepositoryError::UserNotFound)
    }

    async fn by_user_id(&self, user_id: UserId) -> Result<UserReadModel, RepositoryError> {
        self.get(&user_id).ok_or(RepositoryError::UserNotFound)
    }
}
