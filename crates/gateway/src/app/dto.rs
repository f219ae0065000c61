use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stratus_auth::{IssuedToken, UserRoleBinding};
use stratus_core::{ClusterId, UserId};

use crate::auth::Session;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub callback: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackRequest {
    pub code: String,
    pub state: String,
    pub nonce: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiTokenRequest {
    Scoped {
        scopes: Vec<String>,
        validity_secs: i64,
    },
    Kubernetes,
    ClusterBootstrap {
        cluster_id: ClusterId,
    },
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub authorization_url: String,
    pub state: String,
    pub nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
}

impl SessionResponse {
    pub fn from_session(session: Session, callback: Option<String>) -> Self {
        Self {
            expires_at: session.token.expires_at(),
            token: session.token.token,
            refresh_token: session.refresh_token,
            callback,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub audience: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<IssuedToken> for TokenResponse {
    fn from(value: IssuedToken) -> Self {
        Self {
            audience: value.claims.aud.clone(),
            expires_at: value.expires_at(),
            token: value.token,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub subject: String,
    pub email: String,
    pub name: String,
    pub issuer: String,
    pub user_id: Option<UserId>,
    pub role_bindings: Vec<UserRoleBinding>,
}
