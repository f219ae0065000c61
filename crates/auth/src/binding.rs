use serde::{Deserialize, Serialize};

use stratus_core::{RoleBindingId, UserId};

use crate::{Role, Scope};

/// A role granted to a user at a scope, optionally narrowed to one resource
/// (a tenant id for tenant scope, a cluster id for cluster scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleBinding {
    pub id: RoleBindingId,
    pub user_id: UserId,
    pub role: Role,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl UserRoleBinding {
    pub fn new(
        id: RoleBindingId,
        user_id: UserId,
        role: Role,
        scope: Scope,
        resource: Option<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            role,
            scope,
            resource,
        }
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }
}
