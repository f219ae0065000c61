//! User aggregate: identity records and the role bindings they hold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stratus_auth::{Policy, Role, Scope, UserRoleBinding};
use stratus_core::validation::{normalize_display_name, normalize_email};
use stratus_core::{Aggregate, AggregateId, AggregateRoot, DomainError, RoleBindingId, UserId};
use stratus_events::{Command, Event};

pub const AGGREGATE_TYPE: &str = "user";

const KNOWN_ROLES: [Role; 3] = [Role::ADMIN, Role::EDITOR, Role::VIEWER];
const KNOWN_SCOPES: [Scope; 3] = [Scope::SYSTEM, Scope::TENANT, Scope::CLUSTER];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Deleted,
}

/// User aggregate.
///
/// # Invariants
/// - The e-mail is fixed at creation and stored normalized.
/// - Binding ids are unique and no two bindings grant the same
///   (role, scope, resource).
/// - System-scope bindings carry no resource; other scopes require one.
/// - A deleted user accepts no further commands.
#[derive(Debug, Clone)]
pub struct User {
    id: UserId,
    email: String,
    name: String,
    role_bindings: Vec<UserRoleBinding>,
    status: UserStatus,
    version: u64,
    created: bool,
}

impl User {
    /// Not-yet-created instance for rehydration.
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            email: String::new(),
            name: String::new(),
            role_bindings: Vec::new(),
            status: UserStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role_bindings(&self) -> &[UserRoleBinding] {
        &self.role_bindings
    }

    pub fn status(&self) -> UserStatus {
        self.status
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.status == UserStatus::Deleted {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateUser {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateUser {
    pub user_id: UserId,
    pub name: String,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteUser {
    pub user_id: UserId,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateUserRoleBinding {
    pub user_id: UserId,
    pub binding_id: RoleBindingId,
    pub role: Role,
    pub scope: Scope,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

/// Removes a binding. `scope` and `resource` must restate the stored binding;
/// they are what the command's policies are evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteUserRoleBinding {
    pub user_id: UserId,
    pub binding_id: RoleBindingId,
    pub scope: Scope,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    Update(UpdateUser),
    Delete(DeleteUser),
    CreateRoleBinding(CreateUserRoleBinding),
    DeleteRoleBinding(DeleteUserRoleBinding),
}

impl CreateUser {
    pub fn validate(&self) -> Result<(), DomainError> {
        normalize_email(&self.email)?;
        normalize_display_name(&self.name)?;
        Ok(())
    }
}

impl UpdateUser {
    pub fn validate(&self) -> Result<(), DomainError> {
        normalize_display_name(&self.name).map(|_| ())
    }
}

impl CreateUserRoleBinding {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !KNOWN_ROLES.contains(&self.role) {
            return Err(DomainError::validation(format!("unknown role '{}'", self.role)));
        }
        validate_scope_resource(&self.scope, self.resource.as_deref())
    }
}

impl DeleteUserRoleBinding {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_scope_resource(&self.scope, self.resource.as_deref())
    }
}

fn validate_scope_resource(scope: &Scope, resource: Option<&str>) -> Result<(), DomainError> {
    if !KNOWN_SCOPES.contains(scope) {
        return Err(DomainError::validation(format!("unknown scope '{scope}'")));
    }
    match (scope.requires_resource(), resource) {
        (false, Some(_)) => Err(DomainError::validation(
            "system-scope bindings cannot name a resource",
        )),
        (true, None) => Err(DomainError::validation(format!(
            "{scope}-scope bindings must name a resource"
        ))),
        (true, Some(r)) if r.trim().is_empty() => {
            Err(DomainError::validation("binding resource cannot be empty"))
        }
        _ => Ok(()),
    }
}

impl UserCommand {
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            UserCommand::Create(cmd) => cmd.validate(),
            UserCommand::Update(cmd) => cmd.validate(),
            UserCommand::Delete(_) => Ok(()),
            UserCommand::CreateRoleBinding(cmd) => cmd.validate(),
            UserCommand::DeleteRoleBinding(cmd) => cmd.validate(),
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            UserCommand::Create(cmd) => cmd.user_id,
            UserCommand::Update(cmd) => cmd.user_id,
            UserCommand::Delete(cmd) => cmd.user_id,
            UserCommand::CreateRoleBinding(cmd) => cmd.user_id,
            UserCommand::DeleteRoleBinding(cmd) => cmd.user_id,
        }
    }
}

impl Command for UserCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.user_id().into()
    }

    fn aggregate_type(&self) -> &'static str {
        AGGREGATE_TYPE
    }

    fn command_type(&self) -> &'static str {
        match self {
            UserCommand::Create(_) => "user.create",
            UserCommand::Update(_) => "user.update",
            UserCommand::Delete(_) => "user.delete",
            UserCommand::CreateRoleBinding(_) => "user.role_binding.create",
            UserCommand::DeleteRoleBinding(_) => "user.role_binding.delete",
        }
    }

    fn policies(&self) -> Vec<Policy> {
        let system_admin = Policy::role(Role::ADMIN, Scope::SYSTEM);
        match self {
            // Anyone may register the account matching their own login.
            UserCommand::Create(cmd) => vec![system_admin, Policy::subject(cmd.email.trim())],
            UserCommand::Update(_) | UserCommand::Delete(_) => vec![system_admin],
            UserCommand::CreateRoleBinding(cmd) => {
                let mut policies = vec![system_admin];
                if cmd.scope == Scope::TENANT {
                    if let Some(tenant) = &cmd.resource {
                        policies.push(
                            Policy::role(Role::ADMIN, Scope::TENANT).with_resource(tenant.clone()),
                        );
                    }
                }
                policies
            }
            UserCommand::DeleteRoleBinding(cmd) => {
                let mut policies = vec![system_admin];
                // Any tenant admin may remove tenant-scoped bindings, not only
                // those of their own tenant.
                if cmd.scope == Scope::TENANT {
                    policies.push(Policy::role(Role::ADMIN, Scope::TENANT).with_any_resource());
                }
                policies
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUpdated {
    pub user_id: UserId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDeleted {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBindingCreated {
    pub binding: UserRoleBinding,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBindingDeleted {
    pub user_id: UserId,
    pub binding_id: RoleBindingId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    Updated(UserUpdated),
    Deleted(UserDeleted),
    RoleBindingCreated(RoleBindingCreated),
    RoleBindingDeleted(RoleBindingDeleted),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "user.created",
            UserEvent::Updated(_) => "user.updated",
            UserEvent::Deleted(_) => "user.deleted",
            UserEvent::RoleBindingCreated(_) => "user.role_binding.created",
            UserEvent::RoleBindingDeleted(_) => "user.role_binding.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::Updated(e) => e.occurred_at,
            UserEvent::Deleted(e) => e.occurred_at,
            UserEvent::RoleBindingCreated(e) => e.occurred_at,
            UserEvent::RoleBindingDeleted(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => self.apply_created(e),
            UserEvent::Updated(e) => self.name = e.name.clone(),
            UserEvent::Deleted(_) => self.status = UserStatus::Deleted,
            UserEvent::RoleBindingCreated(e) => self.role_bindings.push(e.binding.clone()),
            UserEvent::RoleBindingDeleted(e) => {
                self.role_bindings.retain(|b| b.id != e.binding_id)
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.user_id() != self.id {
            return Err(DomainError::invariant("command targets a different user"));
        }
        command.validate()?;
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::Update(cmd) => self.handle_update(cmd),
            UserCommand::Delete(cmd) => self.handle_delete(cmd),
            UserCommand::CreateRoleBinding(cmd) => self.handle_create_binding(cmd),
            UserCommand::DeleteRoleBinding(cmd) => self.handle_delete_binding(cmd),
        }
    }
}

impl User {
    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }
        Ok(vec![UserEvent::Created(UserCreated {
            user_id: cmd.user_id,
            email: normalize_email(&cmd.email)?,
            name: normalize_display_name(&cmd.name)?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;
        let name = normalize_display_name(&cmd.name)?;
        if name == self.name {
            return Ok(vec![]);
        }
        Ok(vec![UserEvent::Updated(UserUpdated {
            user_id: cmd.user_id,
            name,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;
        Ok(vec![UserEvent::Deleted(UserDeleted {
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_create_binding(
        &self,
        cmd: &CreateUserRoleBinding,
    ) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;
        if self.role_bindings.iter().any(|b| b.id == cmd.binding_id) {
            return Err(DomainError::conflict("role binding id already in use"));
        }
        let resource = cmd.resource.as_ref().map(|r| r.trim().to_string());
        if self.role_bindings.iter().any(|b| {
            b.role == cmd.role && b.scope == cmd.scope && b.resource == resource
        }) {
            return Err(DomainError::invariant("user already holds this role binding"));
        }
        Ok(vec![UserEvent::RoleBindingCreated(RoleBindingCreated {
            binding: UserRoleBinding::new(
                cmd.binding_id,
                cmd.user_id,
                cmd.role.clone(),
                cmd.scope.clone(),
                resource,
            ),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete_binding(
        &self,
        cmd: &DeleteUserRoleBinding,
    ) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;
        let existing = self
            .role_bindings
            .iter()
            .find(|b| b.id == cmd.binding_id)
            .ok_or(DomainError::NotFound)?;
        // Authorization ran against the declared scope and resource.
        if existing.scope != cmd.scope || existing.resource() != cmd.resource.as_deref() {
            return Err(DomainError::validation(
                "scope/resource do not match the stored role binding",
            ));
        }
        Ok(vec![UserEvent::RoleBindingDeleted(RoleBindingDeleted {
            user_id: cmd.user_id,
            binding_id: cmd.binding_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn apply_created(&mut self, e: &UserCreated) {
        self.id = e.user_id;
        self.email = e.email.clone();
        self.name = e.name.clone();
        self.status = UserStatus::Active;
        self.created = true;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
