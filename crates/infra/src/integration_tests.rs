//! Integration tests for the full authorized command pipeline.
//!
//! Tests: CallContext → UserInformationHandler → AuthorizationHandler →
//! AggregateCommandHandler → EventStore → UsersProjection
//!
//! Verifies:
//! - Role bindings written through the pipeline drive later authorization
//! - Self-elevation is blocked while self-registration is allowed
//! - Unknown principals are rejected for every command
//! - Cancelled calls never write

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use stratus_auth::{Role, Scope};
    use stratus_clusters::{ClusterCommand, CreateCluster};
    use stratus_core::{ClusterId, RoleBindingId, TenantId, UserId};
    use stratus_tenants::{CreateTenant, TenantCommand};
    use stratus_users::{CreateUser, CreateUserRoleBinding, UserCommand};

    use crate::commands::ControlPlaneCommand;
    use crate::context::CallContext;
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::metadata::{DomainMetadataManager, UserInformation};
    use crate::pipeline::{
        AggregateCommandHandler, CommandHandler, CommandReply, Pipeline, PipelineBuilder,
        PipelineError,
    };
    use crate::projections::{UserReadModel, UsersProjection};
    use crate::read_model::InMemoryReadModelStore;

    type Users = Arc<UsersProjection<Arc<InMemoryReadModelStore<UserId, UserReadModel>>>>;

    struct Harness {
        pipeline: Pipeline<ControlPlaneCommand>,
        users: Users,
        store: Arc<InMemoryEventStore>,
    }

    const ADMIN: &str = "root@example.com";

    fn setup() -> Harness {
        let store = Arc::new(InMemoryEventStore::new());
        let users: Users = Arc::new(UsersProjection::new(Arc::new(InMemoryReadModelStore::new())));
        let terminal =
            AggregateCommandHandler::new(Arc::clone(&store)).with_projection(users.clone());
        let pipeline = PipelineBuilder::<ControlPlaneCommand>::authorized(users.clone())
            .terminal(terminal)
            .build();
        Harness {
            pipeline,
            users,
            store,
        }
    }

    fn context(email: &str) -> CallContext {
        let mut metadata = DomainMetadataManager::new();
        metadata.set_user_information(&UserInformation {
            email: email.to_string(),
            issuer: "https://stratus.test".to_string(),
            ..UserInformation::default()
        });
        CallContext::new(metadata)
    }

    fn create_user(user_id: UserId, email: &str) -> ControlPlaneCommand {
        UserCommand::Create(CreateUser {
            user_id,
            email: email.to_string(),
            name: email.split('@').next().unwrap_or("user").to_string(),
            occurred_at: Utc::now(),
        })
        .into()
    }

    fn grant(
        user_id: UserId,
        role: Role,
        scope: Scope,
        resource: Option<String>,
    ) -> ControlPlaneCommand {
        UserCommand::CreateRoleBinding(CreateUserRoleBinding {
            user_id,
            binding_id: RoleBindingId::new(),
            role,
            scope,
            resource,
            occurred_at: Utc::now(),
        })
        .into()
    }

    impl Harness {
        async fn run(
            &self,
            email: &str,
            cmd: &ControlPlaneCommand,
        ) -> Result<CommandReply, PipelineError> {
            self.pipeline.handle_command(&mut context(email), cmd).await
        }

        /// Startup bootstrap: the first admin is created with the bypass flag.
        async fn bootstrap_admin(&self) -> UserId {
            let admin_id = UserId::new();
            for cmd in [
                create_user(admin_id, ADMIN),
                grant(admin_id, Role::ADMIN, Scope::SYSTEM, None),
            ] {
                let mut ctx = context(ADMIN);
                ctx.metadata_mut().enable_authorization_bypass();
                self.pipeline.handle_command(&mut ctx, &cmd).await.unwrap();
            }
            admin_id
        }

        /// A directory entry without any role bindings.
        async fn plain_user(&self, email: &str) -> UserId {
            let user_id = UserId::new();
            self.run(ADMIN, &create_user(user_id, email)).await.unwrap();
            user_id
        }
    }

    #[tokio::test]
    async fn system_admin_grants_binding_to_arbitrary_user() {
        let h = setup();
        h.bootstrap_admin().await;
        let target = h.plain_user("bob@example.com").await;

        let reply = h
            .run(ADMIN, &grant(target, Role::VIEWER, Scope::SYSTEM, None))
            .await
            .unwrap();
        assert_eq!(reply.events, ["user.role_binding.created"]);
        assert_eq!(reply.version, Some(2));
        assert_eq!(h.users.get(&target).unwrap().roles().len(), 1);
    }

    #[tokio::test]
    async fn principal_without_bindings_cannot_self_elevate() {
        let h = setup();
        h.bootstrap_admin().await;
        let bob = h.plain_user("bob@example.com").await;

        let result = h
            .run("bob@example.com", &grant(bob, Role::ADMIN, Scope::SYSTEM, None))
            .await;
        assert!(matches!(result, Err(PipelineError::Unauthorized)));
        assert_eq!(h.store.load_stream(bob.into()).unwrap().len(), 1);
        assert!(h.users.get(&bob).unwrap().roles().is_empty());
    }

    #[tokio::test]
    async fn principal_registers_account_for_own_email() {
        let h = setup();
        h.bootstrap_admin().await;
        h.plain_user("carol@example.com").await;

        let own = create_user(UserId::new(), "carol@example.com");
        assert!(h.run("carol@example.com", &own).await.is_ok());

        let foreign = create_user(UserId::new(), "mallory@example.com");
        assert!(matches!(
            h.run("carol@example.com", &foreign).await,
            Err(PipelineError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn unknown_principal_is_rejected_for_every_command() {
        let h = setup();
        h.bootstrap_admin().await;

        let commands = [
            create_user(UserId::new(), "dave@example.com"),
            grant(UserId::new(), Role::ADMIN, Scope::SYSTEM, None),
            TenantCommand::Create(CreateTenant {
                tenant_id: TenantId::new(),
                name: "acme".to_string(),
                display_name: "Acme".to_string(),
                occurred_at: Utc::now(),
            })
            .into(),
        ];
        for cmd in &commands {
            let result = h.run("dave@example.com", cmd).await;
            assert!(matches!(result, Err(PipelineError::Unauthorized)), "{cmd:?}");
        }
    }

    #[tokio::test]
    async fn tenant_binding_scopes_cluster_management() {
        let h = setup();
        h.bootstrap_admin().await;
        let tina = h.plain_user("tina@example.com").await;
        let (acme, globex) = (TenantId::new(), TenantId::new());

        h.run(
            ADMIN,
            &grant(tina, Role::EDITOR, Scope::TENANT, Some(acme.to_string())),
        )
        .await
        .unwrap();

        let cluster_in = |tenant_id: TenantId| -> ControlPlaneCommand {
            ClusterCommand::Create(CreateCluster {
                cluster_id: ClusterId::new(),
                tenant_id,
                name: "prod".to_string(),
                region: "eu-west-1".to_string(),
                kubernetes_version: "1.30".to_string(),
                occurred_at: Utc::now(),
            })
            .into()
        };

        assert!(h.run("tina@example.com", &cluster_in(acme)).await.is_ok());
        assert!(matches!(
            h.run("tina@example.com", &cluster_in(globex)).await,
            Err(PipelineError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn cancelled_call_never_writes() {
        let h = setup();
        h.bootstrap_admin().await;
        let user_id = UserId::new();

        let mut ctx = context(ADMIN);
        ctx.cancel_handle().cancel();
        let result = h
            .pipeline
            .handle_command(&mut ctx, &create_user(user_id, "erin@example.com"))
            .await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(h.store.load_stream(user_id.into()).unwrap().is_empty());
    }
}
