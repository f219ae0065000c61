use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role granted by a role binding (`admin`, `editor`, `viewer`, ...).
///
/// Roles are opaque strings at this layer; what a role may do is decided by
/// the policies each command declares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const EDITOR: Role = Role(Cow::Borrowed("editor"));
    pub const VIEWER: Role = Role(Cow::Borrowed("viewer"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Breadth of a role binding: the whole system, one tenant, or one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(Cow<'static, str>);

impl Scope {
    pub const SYSTEM: Scope = Scope(Cow::Borrowed("system"));
    pub const TENANT: Scope = Scope(Cow::Borrowed("tenant"));
    pub const CLUSTER: Scope = Scope(Cow::Borrowed("cluster"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// System scope grants are not tied to a resource.
    pub fn requires_resource(&self) -> bool {
        *self != Scope::SYSTEM
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_compare_equal_to_owned_values() {
        assert_eq!(Role::ADMIN, Role::new(String::from("admin")));
        assert_eq!(Scope::TENANT, Scope::new("tenant"));
        assert_ne!(Role::ADMIN, Role::EDITOR);
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Scope::CLUSTER).unwrap();
        assert_eq!(json, "\"cluster\"");
        let back: Role = serde_json::from_str("\"viewer\"").unwrap();
        assert_eq!(back, Role::VIEWER);
    }

    #[test]
    fn only_system_scope_is_resourceless() {
        assert!(!Scope::SYSTEM.requires_resource());
        assert!(Scope::TENANT.requires_resource());
        assert!(Scope::CLUSTER.requires_resource());
    }
}
