use std::time::Duration;

use stratus_auth::AuthClaims;
use stratus_infra::{CallContext, ComponentInformation, DomainMetadataManager, UserInformation};

/// Upper bound for a single command call.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated principal of a request, derived from a verified gateway token.
///
/// Present on every route behind the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    claims: AuthClaims,
}

impl Principal {
    pub fn new(claims: AuthClaims) -> Self {
        Self { claims }
    }

    pub fn claims(&self) -> &AuthClaims {
        &self.claims
    }

    pub fn email(&self) -> &str {
        &self.claims.email
    }

    /// The identity provider that vouched for the principal.
    pub fn upstream_issuer(&self) -> &str {
        self.claims
            .federated_claims
            .get("issuer")
            .map(String::as_str)
            .unwrap_or(&self.claims.iss)
    }

    /// Call context for the command pipeline. Identity comes from the verified
    /// claims only; the user id is filled in by identity resolution.
    pub fn call_context(&self, component: &ComponentInformation) -> CallContext {
        let mut metadata = DomainMetadataManager::new();
        metadata.set_user_information(&UserInformation {
            id: String::new(),
            name: self.claims.name.clone(),
            email: self.claims.email.clone(),
            issuer: self.upstream_issuer().to_string(),
        });
        metadata.set_component_information(component);
        CallContext::new(metadata).with_timeout(COMMAND_TIMEOUT)
    }
}
