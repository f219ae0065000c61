use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stratus_auth::{Policy, Role, Scope};
use stratus_core::validation::{normalize_display_name, validate_name};
use stratus_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use stratus_events::{Command, Event};

pub const AGGREGATE_TYPE: &str = "tenant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    #[default]
    Active,
    Deleted,
}

/// Tenant aggregate. The machine `name` is fixed at creation; the display
/// name may change.
#[derive(Debug, Clone)]
pub struct Tenant {
    id: TenantId,
    name: String,
    display_name: String,
    status: TenantStatus,
    version: u64,
    created: bool,
}

impl Tenant {
    pub fn empty(id: TenantId) -> Self {
        Self {
            id,
            name: String::new(),
            display_name: String::new(),
            status: TenantStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn status(&self) -> TenantStatus {
        self.status
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.status == TenantStatus::Deleted {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }
}

impl AggregateRoot for Tenant {
    type Id = TenantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTenant {
    pub tenant_id: TenantId,
    pub name: String,
    pub display_name: String,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTenant {
    pub tenant_id: TenantId,
    pub display_name: String,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteTenant {
    pub tenant_id: TenantId,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TenantCommand {
    Create(CreateTenant),
    Update(UpdateTenant),
    Delete(DeleteTenant),
}

impl TenantCommand {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            TenantCommand::Create(cmd) => cmd.tenant_id,
            TenantCommand::Update(cmd) => cmd.tenant_id,
            TenantCommand::Delete(cmd) => cmd.tenant_id,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            TenantCommand::Create(cmd) => {
                validate_name("tenant name", &cmd.name)?;
                normalize_display_name(&cmd.display_name).map(|_| ())
            }
            TenantCommand::Update(cmd) => normalize_display_name(&cmd.display_name).map(|_| ()),
            TenantCommand::Delete(_) => Ok(()),
        }
    }
}

impl Command for TenantCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.tenant_id().into()
    }

    fn aggregate_type(&self) -> &'static str {
        AGGREGATE_TYPE
    }

    fn command_type(&self) -> &'static str {
        match self {
            TenantCommand::Create(_) => "tenant.create",
            TenantCommand::Update(_) => "tenant.update",
            TenantCommand::Delete(_) => "tenant.delete",
        }
    }

    fn policies(&self) -> Vec<Policy> {
        let system_admin = Policy::role(Role::ADMIN, Scope::SYSTEM);
        match self {
            TenantCommand::Create(_) | TenantCommand::Delete(_) => vec![system_admin],
            TenantCommand::Update(cmd) => vec![
                system_admin,
                Policy::role(Role::ADMIN, Scope::TENANT).with_resource(cmd.tenant_id.to_string()),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantCreated {
    pub tenant_id: TenantId,
    pub name: String,
    pub display_name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantUpdated {
    pub tenant_id: TenantId,
    pub display_name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantDeleted {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TenantEvent {
    Created(TenantCreated),
    Updated(TenantUpdated),
    Deleted(TenantDeleted),
}

impl Event for TenantEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TenantEvent::Created(_) => "tenant.created",
            TenantEvent::Updated(_) => "tenant.updated",
            TenantEvent::Deleted(_) => "tenant.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TenantEvent::Created(e) => e.occurred_at,
            TenantEvent::Updated(e) => e.occurred_at,
            TenantEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Tenant {
    type Command = TenantCommand;
    type Event = TenantEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TenantEvent::Created(e) => {
                self.id = e.tenant_id;
                self.name = e.name.clone();
                self.display_name = e.display_name.clone();
                self.created = true;
            }
            TenantEvent::Updated(e) => self.display_name = e.display_name.clone(),
            TenantEvent::Deleted(_) => self.status = TenantStatus::Deleted,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.tenant_id() != self.id {
            return Err(DomainError::invariant("command targets a different tenant"));
        }
        command.validate()?;
        match command {
            TenantCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("tenant already exists"));
                }
                Ok(vec![TenantEvent::Created(TenantCreated {
                    tenant_id: cmd.tenant_id,
                    name: cmd.name.clone(),
                    display_name: normalize_display_name(&cmd.display_name)?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TenantCommand::Update(cmd) => {
                self.ensure_live()?;
                let display_name = normalize_display_name(&cmd.display_name)?;
                if display_name == self.display_name {
                    return Ok(vec![]);
                }
                Ok(vec![TenantEvent::Updated(TenantUpdated {
                    tenant_id: cmd.tenant_id,
                    display_name,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TenantCommand::Delete(cmd) => {
                self.ensure_live()?;
                Ok(vec![TenantEvent::Deleted(TenantDeleted {
                    tenant_id: cmd.tenant_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_auth::{UserRoleBinding, authorize};
    use stratus_core::{RoleBindingId, UserId};

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn created(tenant_id: TenantId) -> Tenant {
        let mut tenant = Tenant::empty(tenant_id);
        let cmd = TenantCommand::Create(CreateTenant {
            tenant_id,
            name: "acme".to_string(),
            display_name: "Acme Corp".to_string(),
            occurred_at: now(),
        });
        for event in tenant.handle(&cmd).unwrap() {
            tenant.apply(&event);
        }
        tenant
    }

    #[test]
    fn create_and_update() {
        let tenant_id = TenantId::new();
        let mut tenant = created(tenant_id);
        assert_eq!(tenant.name(), "acme");

        let cmd = TenantCommand::Update(UpdateTenant {
            tenant_id,
            display_name: "Acme Inc".to_string(),
            occurred_at: now(),
        });
        for event in tenant.handle(&cmd).unwrap() {
            tenant.apply(&event);
        }
        assert_eq!(tenant.display_name(), "Acme Inc");
        assert_eq!(tenant.version(), 2);
    }

    #[test]
    fn invalid_name_rejected() {
        let tenant_id = TenantId::new();
        let cmd = TenantCommand::Create(CreateTenant {
            tenant_id,
            name: "Acme Corp".to_string(),
            display_name: "Acme".to_string(),
            occurred_at: now(),
        });
        assert!(matches!(
            Tenant::empty(tenant_id).handle(&cmd),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn update_of_missing_tenant_is_not_found() {
        let tenant_id = TenantId::new();
        let cmd = TenantCommand::Update(UpdateTenant {
            tenant_id,
            display_name: "Acme".to_string(),
            occurred_at: now(),
        });
        assert_eq!(Tenant::empty(tenant_id).handle(&cmd), Err(DomainError::NotFound));
    }

    #[test]
    fn tenant_admin_may_update_but_not_delete_own_tenant() {
        let tenant_id = TenantId::new();
        let binding = UserRoleBinding::new(
            RoleBindingId::new(),
            UserId::new(),
            Role::ADMIN,
            Scope::TENANT,
            Some(tenant_id.to_string()),
        );
        let held = std::slice::from_ref(&binding);
        let update = TenantCommand::Update(UpdateTenant {
            tenant_id,
            display_name: "x".to_string(),
            occurred_at: now(),
        });
        let delete = TenantCommand::Delete(DeleteTenant {
            tenant_id,
            occurred_at: now(),
        });
        assert!(authorize(&update.policies(), "a@x.io", Some(held)).is_granted());
        assert!(!authorize(&delete.policies(), "a@x.io", Some(held)).is_granted());
    }
}
