//! Upstream OpenID Connect identity provider.
//!
//! The gateway never trusts upstream tokens directly: it exchanges the login
//! code, verifies the returned id token against the provider's JWKS and then
//! issues its own token (see [`crate::auth`]).

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::config::OidcConfig;

#[derive(Debug, Error)]
pub enum OidcError {
    #[error("provider discovery failed: {0}")]
    Discovery(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("code exchange rejected: {0}")]
    Exchange(String),

    #[error("refresh rejected: {0}")]
    Refresh(String),

    #[error("provider response carries no id token")]
    MissingIdToken,

    #[error("unsupported id token algorithm {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    #[error("id token signing key not found")]
    KeyNotFound,

    #[error("id token rejected: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Tokens returned by the provider's token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTokens {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

/// Verified claims of an upstream id token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpstreamClaims {
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub nonce: Option<String>,
}

#[async_trait]
pub trait OidcProvider: Send + Sync {
    /// Where the browser is sent to log in.
    fn authorization_url(&self, state: &str, nonce: &str) -> String;

    async fn exchange(&self, code: &str) -> Result<UpstreamTokens, OidcError>;

    async fn verify(&self, id_token: &str) -> Result<UpstreamClaims, OidcError>;

    async fn refresh(&self, refresh_token: &str) -> Result<UpstreamTokens, OidcError>;
}

#[async_trait]
impl<T> OidcProvider for Arc<T>
where
    T: OidcProvider + ?Sized,
{
    fn authorization_url(&self, state: &str, nonce: &str) -> String {
        (**self).authorization_url(state, nonce)
    }

    async fn exchange(&self, code: &str) -> Result<UpstreamTokens, OidcError> {
        (**self).exchange(code).await
    }

    async fn verify(&self, id_token: &str) -> Result<UpstreamClaims, OidcError> {
        (**self).verify(id_token).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<UpstreamTokens, OidcError> {
        (**self).refresh(refresh_token).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP provider
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct DiscoveryDocument {
    issuer: String,
    authorization_endpoint: String,
    token_endpoint: String,
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_tokens(self) -> Result<UpstreamTokens, OidcError> {
        Ok(UpstreamTokens {
            id_token: self.id_token.ok_or(OidcError::MissingIdToken)?,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expiry: self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }
}

/// Provider reached over HTTP, configured through OIDC discovery.
#[derive(Debug)]
pub struct HttpOidcProvider {
    client: reqwest::Client,
    config: OidcConfig,
    discovery: DiscoveryDocument,
    jwks: RwLock<JwkSet>,
}

impl HttpOidcProvider {
    /// Fetches the discovery document and the provider's JWKS. One attempt;
    /// callers wrap it in [`crate::backoff::Backoff`].
    pub async fn discover(client: reqwest::Client, config: OidcConfig) -> Result<Self, OidcError> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            config.issuer.trim_end_matches('/')
        );
        let response = client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(OidcError::Discovery(format!(
                "{url} answered {}",
                response.status()
            )));
        }
        let discovery: DiscoveryDocument = response.json().await?;
        if discovery.issuer.trim_end_matches('/') != config.issuer.trim_end_matches('/') {
            return Err(OidcError::Discovery(format!(
                "discovery names issuer '{}', configured '{}'",
                discovery.issuer, config.issuer
            )));
        }

        let jwks: JwkSet = client.get(&discovery.jwks_uri).send().await?.json().await?;
        tracing::info!(
            issuer = %discovery.issuer,
            keys = jwks.keys.len(),
            "identity provider discovered"
        );
        Ok(Self {
            client,
            config,
            discovery,
            jwks: RwLock::new(jwks),
        })
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let response = self
            .client
            .post(&self.discovery.token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{status}: {body}"));
        }
        response.json().await.map_err(|e| e.to_string())
    }

    fn decoding_key(&self, kid: Option<&str>) -> Result<Option<DecodingKey>, OidcError> {
        let jwks = self
            .jwks
            .read()
            .map_err(|_| OidcError::Discovery("jwks cache poisoned".to_string()))?;
        let jwk = match kid {
            Some(kid) => jwks.find(kid),
            None => jwks.keys.first(),
        };
        jwk.map(DecodingKey::from_jwk).transpose().map_err(Into::into)
    }

    async fn refresh_jwks(&self) -> Result<(), OidcError> {
        let fresh: JwkSet = self
            .client
            .get(&self.discovery.jwks_uri)
            .send()
            .await?
            .json()
            .await?;
        let mut jwks = self
            .jwks
            .write()
            .map_err(|_| OidcError::Discovery("jwks cache poisoned".to_string()))?;
        *jwks = fresh;
        Ok(())
    }
}

fn is_algorithm_allowed(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::RS256 | Algorithm::ES256 | Algorithm::EdDSA)
}

#[async_trait]
impl OidcProvider for HttpOidcProvider {
    fn authorization_url(&self, state: &str, nonce: &str) -> String {
        let params = [
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("scope", "openid email profile offline_access"),
            ("state", state),
            ("nonce", nonce),
        ];
        match Url::parse_with_params(&self.discovery.authorization_endpoint, &params) {
            Ok(url) => url.into(),
            Err(err) => {
                tracing::error!(error = %err, "authorization endpoint is not a valid URL");
                self.discovery.authorization_endpoint.clone()
            }
        }
    }

    async fn exchange(&self, code: &str) -> Result<UpstreamTokens, OidcError> {
        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .await
            .map_err(OidcError::Exchange)?;
        response.into_tokens()
    }

    async fn verify(&self, id_token: &str) -> Result<UpstreamClaims, OidcError> {
        let header = jsonwebtoken::decode_header(id_token)?;
        if !is_algorithm_allowed(header.alg) {
            return Err(OidcError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header.kid.as_deref();
        let key = match self.decoding_key(kid)? {
            Some(key) => key,
            None => {
                // Unknown kid: the provider may have rotated its keys.
                self.refresh_jwks().await?;
                self.decoding_key(kid)?.ok_or(OidcError::KeyNotFound)?
            }
        };

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[self.discovery.issuer.as_str()]);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation.leeway = 30;
        let data = jsonwebtoken::decode::<UpstreamClaims>(id_token, &key, &validation)?;
        Ok(data.claims)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<UpstreamTokens, OidcError> {
        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .await
            .map_err(OidcError::Refresh)?;
        response.into_tokens()
    }
}
