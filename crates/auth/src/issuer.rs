//! Token minting for the different token kinds the gateway hands out.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use stratus_core::ClusterId;

use crate::{Audience, AuthClaims, ClusterClaim, Signer, TokenError};

/// Bootstrap tokens only need to outlive a cluster agent's first start.
pub const CLUSTER_BOOTSTRAP_VALIDITY: Duration = Duration::minutes(10);

/// Who a token is issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub federated_claims: BTreeMap<String, String>,
}

impl TokenSubject {
    /// Subject of a freshly verified upstream id token.
    pub fn from_upstream(
        upstream_issuer: &str,
        upstream_subject: &str,
        name: impl Into<String>,
        email: impl Into<String>,
        email_verified: bool,
    ) -> Self {
        let mut federated_claims = BTreeMap::new();
        federated_claims.insert("issuer".to_string(), upstream_issuer.to_string());
        federated_claims.insert("subject".to_string(), upstream_subject.to_string());
        Self {
            sub: upstream_subject.to_string(),
            name: name.into(),
            email: email.into(),
            email_verified,
            federated_claims,
        }
    }
}

impl From<&AuthClaims> for TokenSubject {
    fn from(claims: &AuthClaims) -> Self {
        Self {
            sub: claims.sub.clone(),
            name: claims.name.clone(),
            email: claims.email.clone(),
            email_verified: claims.email_verified,
            federated_claims: claims.federated_claims.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Interactive session token for the API.
    Api { validity: Duration },
    /// Token presented to managed clusters' API servers.
    KubernetesAuth,
    /// Long-lived automation token restricted to `scopes`.
    ApiWithScopes {
        scopes: Vec<String>,
        validity: Duration,
    },
    /// Short-lived token a new cluster uses to register itself.
    ClusterBootstrap { cluster_id: ClusterId },
}

impl TokenKind {
    pub fn audience(&self) -> Audience {
        match self {
            TokenKind::KubernetesAuth => Audience::Kubernetes,
            _ => Audience::Api,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: AuthClaims,
}

impl IssuedToken {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims.expires_at()
    }
}

/// Builds claims for a [`TokenKind`] and signs them.
#[derive(Debug)]
pub struct TokenIssuer {
    signer: Signer,
    kubernetes_validity: Duration,
}

impl TokenIssuer {
    pub fn new(signer: Signer, kubernetes_validity: Duration) -> Self {
        Self {
            signer,
            kubernetes_validity,
        }
    }

    pub fn issue(
        &self,
        subject: &TokenSubject,
        kind: &TokenKind,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let (validity, scope, is_api_token, cluster) = match kind {
            TokenKind::Api { validity } => (*validity, "api".to_string(), false, None),
            TokenKind::KubernetesAuth => {
                (self.kubernetes_validity, "kubernetes".to_string(), false, None)
            }
            TokenKind::ApiWithScopes { scopes, validity } => {
                (*validity, scopes.join(" "), true, None)
            }
            TokenKind::ClusterBootstrap { cluster_id } => (
                CLUSTER_BOOTSTRAP_VALIDITY,
                "cluster:bootstrap".to_string(),
                true,
                Some(ClusterClaim { id: *cluster_id }),
            ),
        };
        if validity <= Duration::zero() {
            return Err(TokenError::InvalidValidity);
        }

        let claims = AuthClaims {
            jti: Uuid::new_v4().to_string(),
            iss: self.signer.issuer().to_string(),
            sub: subject.sub.clone(),
            exp: (now + validity).timestamp(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            aud: kind.audience().as_str().to_string(),
            name: subject.name.clone(),
            email: subject.email.clone(),
            email_verified: subject.email_verified,
            federated_claims: subject.federated_claims.clone(),
            cluster,
            scope,
            is_api_token,
        };
        let token = self.signer.generate_signed_token(&claims)?;
        tracing::debug!(
            jti = %claims.jti,
            aud = %claims.aud,
            sub = %claims.sub,
            "issued token"
        );
        Ok(IssuedToken { token, claims })
    }
}
