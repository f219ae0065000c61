//! Startup creation of the first administrator.

use chrono::Utc;

use stratus_auth::{Role, Scope};
use stratus_core::{RoleBindingId, UserId};
use stratus_infra::{
    CallContext, CommandHandler, ControlPlaneCommand, DomainMetadataManager, PipelineError,
    UserInformation,
};
use stratus_users::{CreateUser, CreateUserRoleBinding, UserCommand};

use crate::app::services::GatewayServices;

/// Ensures `email` exists with an `admin`/`system` binding. Runs through the
/// regular pipeline with the authorization bypass set; a second run is a
/// no-op.
pub async fn bootstrap_admin(
    services: &GatewayServices,
    email: &str,
) -> Result<UserId, PipelineError> {
    let existing = services.users.get_by_email(email);
    if let Some(user) = &existing
        && user
            .roles()
            .iter()
            .any(|b| b.role == Role::ADMIN && b.scope == Scope::SYSTEM)
    {
        tracing::debug!(email, user_id = %user.user_id, "bootstrap admin already present");
        return Ok(user.user_id);
    }

    let mut commands = Vec::new();
    let user_id = match existing {
        Some(user) => user.user_id,
        None => {
            let user_id = UserId::new();
            commands.push(UserCommand::Create(CreateUser {
                user_id,
                email: email.to_string(),
                name: email.split('@').next().unwrap_or(email).to_string(),
                occurred_at: Utc::now(),
            }));
            user_id
        }
    };
    commands.push(UserCommand::CreateRoleBinding(CreateUserRoleBinding {
        user_id,
        binding_id: RoleBindingId::new(),
        role: Role::ADMIN,
        scope: Scope::SYSTEM,
        resource: None,
        occurred_at: Utc::now(),
    }));

    for cmd in commands {
        let mut metadata = DomainMetadataManager::new();
        metadata.set_user_information(&UserInformation {
            email: email.to_string(),
            ..UserInformation::default()
        });
        metadata.set_component_information(&services.component);
        metadata.enable_authorization_bypass();

        services
            .pipeline
            .handle_command(&mut CallContext::new(metadata), &ControlPlaneCommand::from(cmd))
            .await?;
    }
    tracing::warn!(email, user_id = %user_id, "bootstrap admin granted admin/system");
    Ok(user_id)
}
