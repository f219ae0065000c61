use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stratus_auth::{Policy, Role, Scope};
use stratus_core::validation::validate_name;
use stratus_core::{Aggregate, AggregateId, AggregateRoot, ClusterId, DomainError, TenantId};
use stratus_events::{Command, Event};

pub const AGGREGATE_TYPE: &str = "cluster";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    #[default]
    Active,
    Deleted,
}

/// Cluster aggregate.
///
/// # Invariants
/// - A cluster belongs to exactly one tenant, fixed at creation.
/// - Commands must name the owning tenant; tenant-scoped policies are
///   evaluated against that value.
#[derive(Debug, Clone)]
pub struct Cluster {
    id: ClusterId,
    tenant_id: Option<TenantId>,
    name: String,
    region: String,
    kubernetes_version: String,
    status: ClusterStatus,
    version: u64,
    created: bool,
}

impl Cluster {
    pub fn empty(id: ClusterId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            region: String::new(),
            kubernetes_version: String::new(),
            status: ClusterStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn kubernetes_version(&self) -> &str {
        &self.kubernetes_version
    }

    pub fn status(&self) -> ClusterStatus {
        self.status
    }

    fn ensure_live(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created || self.status == ClusterStatus::Deleted {
            return Err(DomainError::NotFound);
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for Cluster {
    type Id = ClusterId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCluster {
    pub cluster_id: ClusterId,
    pub tenant_id: TenantId,
    pub name: String,
    pub region: String,
    pub kubernetes_version: String,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCluster {
    pub cluster_id: ClusterId,
    pub tenant_id: TenantId,
    pub kubernetes_version: String,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteCluster {
    pub cluster_id: ClusterId,
    pub tenant_id: TenantId,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClusterCommand {
    Create(CreateCluster),
    Update(UpdateCluster),
    Delete(DeleteCluster),
}

/// Accepts `MAJOR.MINOR` or `MAJOR.MINOR.PATCH`, optionally prefixed with `v`.
fn validate_kubernetes_version(raw: &str) -> Result<(), DomainError> {
    let version = raw.strip_prefix('v').unwrap_or(raw);
    let parts: Vec<&str> = version.split('.').collect();
    let well_formed = (2..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if !well_formed {
        return Err(DomainError::validation(format!(
            "invalid kubernetes version '{raw}'"
        )));
    }
    Ok(())
}

impl ClusterCommand {
    pub fn cluster_id(&self) -> ClusterId {
        match self {
            ClusterCommand::Create(cmd) => cmd.cluster_id,
            ClusterCommand::Update(cmd) => cmd.cluster_id,
            ClusterCommand::Delete(cmd) => cmd.cluster_id,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            ClusterCommand::Create(cmd) => cmd.tenant_id,
            ClusterCommand::Update(cmd) => cmd.tenant_id,
            ClusterCommand::Delete(cmd) => cmd.tenant_id,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            ClusterCommand::Create(cmd) => {
                validate_name("cluster name", &cmd.name)?;
                validate_name("region", &cmd.region)?;
                validate_kubernetes_version(&cmd.kubernetes_version)
            }
            ClusterCommand::Update(cmd) => validate_kubernetes_version(&cmd.kubernetes_version),
            ClusterCommand::Delete(_) => Ok(()),
        }
    }
}

impl Command for ClusterCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.cluster_id().into()
    }

    fn aggregate_type(&self) -> &'static str {
        AGGREGATE_TYPE
    }

    fn command_type(&self) -> &'static str {
        match self {
            ClusterCommand::Create(_) => "cluster.create",
            ClusterCommand::Update(_) => "cluster.update",
            ClusterCommand::Delete(_) => "cluster.delete",
        }
    }

    fn policies(&self) -> Vec<Policy> {
        let tenant = self.tenant_id().to_string();
        let mut policies = vec![
            Policy::role(Role::ADMIN, Scope::SYSTEM),
            Policy::role(Role::ADMIN, Scope::TENANT).with_resource(tenant.clone()),
        ];
        if !matches!(self, ClusterCommand::Delete(_)) {
            policies.push(Policy::role(Role::EDITOR, Scope::TENANT).with_resource(tenant));
        }
        policies
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCreated {
    pub cluster_id: ClusterId,
    pub tenant_id: TenantId,
    pub name: String,
    pub region: String,
    pub kubernetes_version: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterUpdated {
    pub cluster_id: ClusterId,
    pub kubernetes_version: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDeleted {
    pub cluster_id: ClusterId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClusterEvent {
    Created(ClusterCreated),
    Updated(ClusterUpdated),
    Deleted(ClusterDeleted),
}

impl Event for ClusterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClusterEvent::Created(_) => "cluster.created",
            ClusterEvent::Updated(_) => "cluster.updated",
            ClusterEvent::Deleted(_) => "cluster.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ClusterEvent::Created(e) => e.occurred_at,
            ClusterEvent::Updated(e) => e.occurred_at,
            ClusterEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Cluster {
    type Command = ClusterCommand;
    type Event = ClusterEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ClusterEvent::Created(e) => {
                self.id = e.cluster_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.region = e.region.clone();
                self.kubernetes_version = e.kubernetes_version.clone();
                self.created = true;
            }
            ClusterEvent::Updated(e) => self.kubernetes_version = e.kubernetes_version.clone(),
            ClusterEvent::Deleted(_) => self.status = ClusterStatus::Deleted,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.cluster_id() != self.id {
            return Err(DomainError::invariant("command targets a different cluster"));
        }
        command.validate()?;
        match command {
            ClusterCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("cluster already exists"));
                }
                Ok(vec![ClusterEvent::Created(ClusterCreated {
                    cluster_id: cmd.cluster_id,
                    tenant_id: cmd.tenant_id,
                    name: cmd.name.clone(),
                    region: cmd.region.clone(),
                    kubernetes_version: cmd.kubernetes_version.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            ClusterCommand::Update(cmd) => {
                self.ensure_live(cmd.tenant_id)?;
                if cmd.kubernetes_version == self.kubernetes_version {
                    return Ok(vec![]);
                }
                Ok(vec![ClusterEvent::Updated(ClusterUpdated {
                    cluster_id: cmd.cluster_id,
                    kubernetes_version: cmd.kubernetes_version.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            ClusterCommand::Delete(cmd) => {
                self.ensure_live(cmd.tenant_id)?;
                Ok(vec![ClusterEvent::Deleted(ClusterDeleted {
                    cluster_id: cmd.cluster_id,
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

    fn created(cluster_id: ClusterId, tenant_id: TenantId) -> Cluster {
        let mut cluster = Cluster::empty(cluster_id);
        let cmd = ClusterCommand::Create(CreateCluster {
            cluster_id,
            tenant_id,
            name: "prod-eu-1".to_string(),
            region: "eu-west-1".to_string(),
            kubernetes_version: "1.30".to_string(),
            occurred_at: now(),
        });
        for event in cluster.handle(&cmd).unwrap() {
            cluster.apply(&event);
        }
        cluster
    }

    fn editor_of(tenant_id: TenantId) -> UserRoleBinding {
        UserRoleBinding::new(
            RoleBindingId::new(),
            UserId::new(),
            Role::EDITOR,
            Scope::TENANT,
            Some(tenant_id.to_string()),
        )
    }

    #[test]
    fn upgrade_changes_version() {
        let (cluster_id, tenant_id) = (ClusterId::new(), TenantId::new());
        let mut cluster = created(cluster_id, tenant_id);
        let cmd = ClusterCommand::Update(UpdateCluster {
            cluster_id,
            tenant_id,
            kubernetes_version: "v1.31.2".to_string(),
            occurred_at: now(),
        });
        for event in cluster.handle(&cmd).unwrap() {
            cluster.apply(&event);
        }
        assert_eq!(cluster.kubernetes_version(), "v1.31.2");
        assert_eq!(cluster.tenant_id(), Some(tenant_id));
    }

    #[test]
    fn commands_must_name_owning_tenant() {
        let (cluster_id, tenant_id) = (ClusterId::new(), TenantId::new());
        let cluster = created(cluster_id, tenant_id);
        let cmd = ClusterCommand::Delete(DeleteCluster {
            cluster_id,
            tenant_id: TenantId::new(),
            occurred_at: now(),
        });
        assert!(matches!(
            cluster.handle(&cmd),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn malformed_version_rejected() {
        for bad in ["", "1", "1.x", "latest", "1.30.1.2"] {
            assert!(validate_kubernetes_version(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn tenant_editor_may_create_but_not_delete() {
        let tenant_id = TenantId::new();
        let editor = editor_of(tenant_id);
        let held = std::slice::from_ref(&editor);
        let create = ClusterCommand::Create(CreateCluster {
            cluster_id: ClusterId::new(),
            tenant_id,
            name: "dev".to_string(),
            region: "us-east-1".to_string(),
            kubernetes_version: "1.30".to_string(),
            occurred_at: now(),
        });
        let delete = ClusterCommand::Delete(DeleteCluster {
            cluster_id: ClusterId::new(),
            tenant_id,
            occurred_at: now(),
        });
        assert!(authorize(&create.policies(), "e@x.io", Some(held)).is_granted());
        assert!(!authorize(&delete.policies(), "e@x.io", Some(held)).is_granted());
    }

    #[test]
    fn editor_of_other_tenant_is_denied() {
        let create = ClusterCommand::Create(CreateCluster {
            cluster_id: ClusterId::new(),
            tenant_id: TenantId::new(),
            name: "dev".to_string(),
            region: "us-east-1".to_string(),
            kubernetes_version: "1.30".to_string(),
            occurred_at: now(),
        });
        let other = editor_of(TenantId::new());
        assert!(!authorize(&create.policies(), "e@x.io", Some(std::slice::from_ref(&other))).is_granted());
    }
}
