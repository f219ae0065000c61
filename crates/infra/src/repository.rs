//! Read-only user directory consumed by the command pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use stratus_core::UserId;

use crate::projections::UserReadModel;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("user not found")]
    UserNotFound,

    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ReadOnlyUserRepository: Send + Sync {
    /// Exact lookup after trimming and lower-casing `email`.
    async fn by_email(&self, email: &str) -> Result<UserReadModel, RepositoryError>;

    async fn by_user_id(&self, user_id: UserId) -> Result<UserReadModel, RepositoryError>;
}

#[async_trait]
impl<R> ReadOnlyUserRepository for Arc<R>
where
    R: ReadOnlyUserRepository + ?Sized,
{
    async fn by_email(&self, email: &str) -> Result<UserReadModel, RepositoryError> {
        (**self).by_email(email).await
    }

    async fn by_user_id(&self, user_id: UserId) -> Result<UserReadModel, RepositoryError> {
        (**self).by_user_id(user_id).await
    }
}
