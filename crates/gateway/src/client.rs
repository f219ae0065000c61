//! HTTP client for the gateway, as used by the CLI and automation.
//!
//! Failures are classified so callers can decide between prompting for a new
//! login and aborting: see [`ClientError::requires_login`] and
//! [`ClientError::is_security_fault`].

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use stratus_infra::{CommandEnvelope, CommandReply, ControlPlaneCommand};

use crate::app::dto::{
    ApiTokenRequest, CallbackRequest, LoginResponse, RefreshRequest, SessionResponse,
    TokenResponse, WhoAmIResponse,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cannot encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("not logged in")]
    NotLoggedIn,

    #[error("{status} {code}: {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },
}

impl ClientError {
    fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// The session is gone; the user has to log in again.
    pub fn requires_login(&self) -> bool {
        matches!(self, ClientError::NotLoggedIn)
            || matches!(self.code(), Some("expired" | "refresh_failed"))
    }

    /// The gateway saw a forged, foreign or replayed credential.
    pub fn is_security_fault(&self) -> bool {
        matches!(
            self.code(),
            Some("invalid_signature" | "nonce_mismatch" | "issuer_mismatch")
        )
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: String,
}

/// Gateway token plus the upstream refresh token, when one was granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn token(&self) -> Result<&str, ClientError> {
        self.credentials
            .as_ref()
            .map(|c| c.token.as_str())
            .ok_or(ClientError::NotLoggedIn)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => (parsed.error, parsed.message),
            Err(_) => ("http_error".to_string(), body),
        };
        Err(ClientError::Api {
            status,
            code,
            message,
        })
    }

    pub async fn start_login(&self, callback: &str) -> Result<LoginResponse, ClientError> {
        let response = self
            .http
            .get(self.url("/auth/login"))
            .query(&[("callback", callback)])
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Completes the login and keeps the resulting credentials.
    pub async fn complete_login(
        &mut self,
        code: &str,
        state: &str,
        nonce: &str,
    ) -> Result<SessionResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/auth/callback"))
            .json(&CallbackRequest {
                code: code.to_string(),
                state: state.to_string(),
                nonce: nonce.to_string(),
            })
            .send()
            .await?;
        let session: SessionResponse = Self::decode(response).await?;
        self.credentials = Some(Credentials {
            token: session.token.clone(),
            refresh_token: session.refresh_token.clone(),
        });
        Ok(session)
    }

    /// Trades the current session for a fresh token. Without a refresh token
    /// the only way forward is a new login.
    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        let credentials = self.credentials.as_ref().ok_or(ClientError::NotLoggedIn)?;
        let refresh_token = credentials
            .refresh_token
            .clone()
            .ok_or(ClientError::NotLoggedIn)?;
        let response = self
            .http
            .post(self.url("/auth/refresh"))
            .json(&RefreshRequest {
                token: credentials.token.clone(),
                refresh_token,
            })
            .send()
            .await?;
        let session: SessionResponse = Self::decode(response).await?;
        self.credentials = Some(Credentials {
            token: session.token,
            refresh_token: session.refresh_token,
        });
        Ok(())
    }

    pub async fn whoami(&self) -> Result<WhoAmIResponse, ClientError> {
        let response = self
            .http
            .get(self.url("/whoami"))
            .bearer_auth(self.token()?)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn issue_token(&self, request: &ApiTokenRequest) -> Result<TokenResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/auth/api-tokens"))
            .bearer_auth(self.token()?)
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn send_command(&self, envelope: &CommandEnvelope) -> Result<CommandReply, ClientError> {
        let response = self
            .http
            .post(self.url("/commands"))
            .bearer_auth(self.token()?)
            .json(envelope)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Executes `command`. An expired session is refreshed once and the
    /// command retried.
    pub async fn execute(&mut self, command: &ControlPlaneCommand) -> Result<CommandReply, ClientError> {
        let envelope = CommandEnvelope::from_command(command)?;
        match self.send_command(&envelope).await {
            Err(err) if err.code() == Some("expired") => {
                tracing::debug!("session expired, refreshing");
                self.refresh().await?;
                self.send_command(&envelope).await
            }
            other => other,
        }
    }
}
