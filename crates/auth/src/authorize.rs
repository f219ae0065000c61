use serde::Serialize;

use stratus_core::RoleBindingId;

use crate::{Policy, UserRoleBinding};

/// What satisfied an accepting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grant {
    /// A subject policy matched the principal's e-mail.
    Subject,
    /// A role binding held by the principal satisfied the policy.
    Binding { binding_id: RoleBindingId },
}

/// Outcome of evaluating a command's policies against a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// `policy_index` is the first policy, in declaration order, that accepted.
    Granted { policy_index: usize, grant: Grant },
    Denied,
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted { .. })
    }
}

/// Evaluates `policies` for the principal identified by `email`.
///
/// Access is granted if any policy accepts any held binding, or if a subject
/// policy matches `email`. `bindings` is `None` when identity resolution was
/// skipped; then only subject policies can grant. Policies are tried in order
/// and the first accepting one is reported.
///
/// - No IO
/// - No panics
pub fn authorize(
    policies: &[Policy],
    email: &str,
    bindings: Option<&[UserRoleBinding]>,
) -> Decision {
    let bindings = bindings.unwrap_or_default();
    for (policy_index, policy) in policies.iter().enumerate() {
        if policy.is_subject_policy() {
            if policy.accepts(None, None, None, email) {
                return Decision::Granted {
                    policy_index,
                    grant: Grant::Subject,
                };
            }
            continue;
        }
        if let Some(binding) = bindings.iter().find(|b| policy.accepts_binding(b, email)) {
            return Decision::Granted {
                policy_index,
                grant: Grant::Binding {
                    binding_id: binding.id,
                },
            };
        }
    }
    Decision::Denied
}
