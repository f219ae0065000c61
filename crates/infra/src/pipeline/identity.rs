use async_trait::async_trait;
use tracing::{debug, info, warn};

use stratus_events::Command;

use crate::context::CallContext;
use crate::pipeline::{CommandReply, Middleware, Next, PipelineError};
use crate::repository::{ReadOnlyUserRepository, RepositoryError};

/// Resolves the calling principal by e-mail and records its user id and
/// role bindings on the call context.
///
/// An e-mail the directory does not know fails as
/// [`PipelineError::Unauthorized`], the same error a denied command gets.
pub struct UserInformationHandler<R> {
    users: R,
}

impl<R> UserInformationHandler<R> {
    pub fn new(users: R) -> Self {
        Self { users }
    }
}

#[async_trait]
impl<C, R> Middleware<C> for UserInformationHandler<R>
where
    C: Command,
    R: ReadOnlyUserRepository,
{
    async fn handle(
        &self,
        ctx: &mut CallContext,
        cmd: &C,
        next: Next<C>,
    ) -> Result<CommandReply, PipelineError> {
        ctx.ensure_active()?;
        let email = ctx.metadata().user_information().email;

        if ctx.metadata().authorization_bypass() {
            warn!(
                command_type = cmd.command_type(),
                aggregate_id = %cmd.target_aggregate_id(),
                email = %email,
                "authorization bypass set; skipping identity resolution"
            );
            return next.run(ctx, cmd).await;
        }

        let user = match self.users.by_email(&email).await {
            Ok(user) => user,
            Err(RepositoryError::UserNotFound) => {
                info!(
                    command_type = cmd.command_type(),
                    email = %email,
                    "principal not found in user directory"
                );
                return Err(PipelineError::Unauthorized);
            }
            Err(err) => return Err(err.into()),
        };

        debug!(
            user_id = %user.user_id,
            role_bindings = user.role_bindings.len(),
            "resolved principal"
        );
        let metadata = ctx.metadata_mut();
        metadata.set_user_id(user.user_id.to_string());
        metadata.set_role_bindings(user.role_bindings);

        next.run(ctx, cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use stratus_auth::{Role, Scope, UserRoleBinding};
    use stratus_core::{RoleBindingId, TenantId, UserId};
    use stratus_tenants::{DeleteTenant, TenantCommand};

    use crate::metadata::{AUTH_ID, DomainMetadataManager, UserInformation};
    use crate::pipeline::{CommandHandler, PipelineBuilder};
    use crate::projections::UserReadModel;

    struct Directory(Result<UserReadModel, RepositoryError>);

    #[async_trait]
    impl ReadOnlyUserRepository for Directory {
        async fn by_email(&self, _email: &str) -> Result<UserReadModel, RepositoryError> {
            self.0.clone()
        }

        async fn by_user_id(&self, _user_id: UserId) -> Result<UserReadModel, RepositoryError> {
            self.0.clone()
        }
    }

    fn ada() -> UserReadModel {
        let user_id = UserId::new();
        UserReadModel {
            user_id,
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            role_bindings: vec![UserRoleBinding::new(
                RoleBindingId::new(),
                user_id,
                Role::ADMIN,
                Scope::SYSTEM,
                None,
            )],
            version: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn context(email: &str) -> CallContext {
        let mut metadata = DomainMetadataManager::new();
        metadata.set_user_information(&UserInformation {
            email: email.to_string(),
            ..UserInformation::default()
        });
        CallContext::new(metadata)
    }

    fn command() -> TenantCommand {
        TenantCommand::Delete(DeleteTenant {
            tenant_id: TenantId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn enriches_context_with_id_and_bindings() {
        let user = ada();
        let pipeline = PipelineBuilder::<TenantCommand>::new()
            .stage(UserInformationHandler::new(Directory(Ok(user.clone()))))
            .build();
        let mut ctx = context("ada@example.com");

        pipeline.handle_command(&mut ctx, &command()).await.unwrap();
        assert_eq!(ctx.metadata().get(AUTH_ID), Some(user.user_id.to_string().as_str()));
        assert_eq!(ctx.metadata().role_bindings(), Some(user.role_bindings.as_slice()));
    }

    #[tokio::test]
    async fn resolving_twice_yields_same_bindings() {
        let user = ada();
        let pipeline = PipelineBuilder::<TenantCommand>::new()
            .stage(UserInformationHandler::new(Directory(Ok(user.clone()))))
            .build();
        let mut ctx = context("ada@example.com");
        let cmd = command();

        pipeline.handle_command(&mut ctx, &cmd).await.unwrap();
        let first = ctx.metadata().role_bindings().map(<[_]>::to_vec);
        pipeline.handle_command(&mut ctx, &cmd).await.unwrap();
        assert_eq!(ctx.metadata().role_bindings().map(<[_]>::to_vec), first);
    }

    #[tokio::test]
    async fn unknown_principal_is_unauthorized() {
        let pipeline = PipelineBuilder::<TenantCommand>::new()
            .stage(UserInformationHandler::new(Directory(Err(RepositoryError::UserNotFound))))
            .build();
        let result = pipeline.handle_command(&mut context("eve@example.com"), &command()).await;
        assert!(matches!(result, Err(PipelineError::Unauthorized)));
    }

    #[tokio::test]
    async fn directory_outage_propagates() {
        let pipeline = PipelineBuilder::<TenantCommand>::new()
            .stage(UserInformationHandler::new(Arc::new(Directory(Err(
                RepositoryError::Unavailable("timeout".to_string()),
            )))))
            .build();
        let result = pipeline.handle_command(&mut context("ada@example.com"), &command()).await;
        assert!(matches!(
            result,
            Err(PipelineError::Repository(RepositoryError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn bypass_skips_lookup() {
        let pipeline = PipelineBuilder::<TenantCommand>::new()
            .stage(UserInformationHandler::new(Directory(Err(RepositoryError::UserNotFound))))
            .build();
        let mut ctx = context("bootstrap@example.com");
        ctx.metadata_mut().enable_authorization_bypass();

        assert!(pipeline.handle_command(&mut ctx, &command()).await.is_ok());
        assert!(ctx.metadata().role_bindings().is_none());
    }

    #[tokio::test]
    async fn cancelled_call_stops_before_lookup() {
        let pipeline = PipelineBuilder::<TenantCommand>::new()
            .stage(UserInformationHandler::new(Directory(Ok(ada()))))
            .build();
        let mut ctx = context("ada@example.com");
        ctx.cancel_handle().cancel();
        let result = pipeline.handle_command(&mut ctx, &command()).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
