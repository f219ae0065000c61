//! Authorization policies declared by commands.

use crate::{Role, Scope, UserRoleBinding};

/// How a policy constrains the resource of a role binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResourceMatch {
    /// Any resource, including none.
    #[default]
    Unconstrained,
    /// The binding's resource must equal this value.
    Exact(String),
    /// The binding must name some resource, whichever it is.
    AnyNonEmpty,
}

impl ResourceMatch {
    fn is_unconstrained(&self) -> bool {
        matches!(self, ResourceMatch::Unconstrained)
    }

    fn accepts(&self, resource: Option<&str>) -> bool {
        match self {
            ResourceMatch::Unconstrained => true,
            ResourceMatch::Exact(expected) => resource == Some(expected.as_str()),
            ResourceMatch::AnyNonEmpty => resource.is_some_and(|r| !r.is_empty()),
        }
    }
}

/// Immutable predicate over (role, scope, resource, subject).
///
/// Unset fields are wildcards. A subject constraint matches the principal's
/// e-mail exactly and ignores the role and scope of any binding, which is how
/// self-service commands (creating your own user) are expressed. A policy
/// with no constraint at all accepts nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    role: Option<Role>,
    scope: Option<Scope>,
    resource: ResourceMatch,
    subject: Option<String>,
}

impl Policy {
    /// Holders of `role` at `scope`, any resource.
    pub fn role(role: Role, scope: Scope) -> Self {
        Self {
            role: Some(role),
            scope: Some(scope),
            ..Self::default()
        }
    }

    /// Principal whose authenticated e-mail is exactly `email`.
    pub fn subject(email: impl Into<String>) -> Self {
        Self {
            subject: Some(email.into()),
            ..Self::default()
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = ResourceMatch::Exact(resource.into());
        self
    }

    pub fn with_any_resource(mut self) -> Self {
        self.resource = ResourceMatch::AnyNonEmpty;
        self
    }

    pub fn role_constraint(&self) -> Option<&Role> {
        self.role.as_ref()
    }

    pub fn scope_constraint(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn resource_constraint(&self) -> &ResourceMatch {
        &self.resource
    }

    pub fn subject_constraint(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn is_subject_policy(&self) -> bool {
        self.subject.is_some()
    }

    fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.scope.is_none()
            && self.resource.is_unconstrained()
            && self.subject.is_none()
    }

    /// Evaluates the policy against one (role, scope, resource) triple held by
    /// the principal identified by `subject`.
    pub fn accepts(
        &self,
        role: Option<&Role>,
        scope: Option<&Scope>,
        resource: Option<&str>,
        subject: &str,
    ) -> bool {
        if self.is_empty() {
            return false;
        }
        if let Some(expected) = &self.subject {
            return !subject.is_empty() && expected == subject;
        }
        if let Some(expected) = &self.role {
            if role != Some(expected) {
                return false;
            }
        }
        if let Some(expected) = &self.scope {
            if scope != Some(expected) {
                return false;
            }
        }
        self.resource.accepts(resource)
    }

    pub fn accepts_binding(&self, binding: &UserRoleBinding, subject: &str) -> bool {
        self.accepts(
            Some(&binding.role),
            Some(&binding.scope),
            binding.resource(),
            subject,
        )
    }
}
