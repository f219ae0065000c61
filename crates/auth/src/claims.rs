use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratus_core::ClusterId;

/// Token class, carried in the `aud` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Audience {
    /// Accepted by the control-plane API.
    #[serde(rename = "stratus-api")]
    Api,
    /// Accepted by managed clusters' Kubernetes API servers.
    #[serde(rename = "stratus-kubernetes")]
    Kubernetes,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Api => "stratus-api",
            Audience::Kubernetes => "stratus-kubernetes",
        }
    }
}

impl core::fmt::Display for Audience {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binds a bootstrap token to the cluster it was minted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterClaim {
    pub id: ClusterId,
}

/// Claims of a gateway-issued JWT. Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClaims {
    pub jti: String,
    pub iss: String,
    pub sub: String,
    pub exp: i64,
    pub nbf: i64,
    pub iat: i64,
    pub aud: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    /// Upstream identity the token was derived from (issuer, subject).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub federated_claims: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterClaim>,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub is_api_token: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsTimeError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,
}

impl AuthClaims {
    pub fn audience(&self) -> Option<Audience> {
        match self.aud.as_str() {
            "stratus-api" => Some(Audience::Api),
            "stratus-kubernetes" => Some(Audience::Kubernetes),
            _ => None,
        }
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// A token is expired from the exact second named by `exp` onwards.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    /// Checks the validity window: `nbf <= now < exp`.
    pub fn check_time_window(&self, now: DateTime<Utc>) -> Result<(), ClaimsTimeError> {
        if self.is_expired_at(now) {
            return Err(ClaimsTimeError::Expired);
        }
        if now.timestamp() < self.nbf {
            return Err(ClaimsTimeError::NotYetValid);
        }
        Ok(())
    }
}
