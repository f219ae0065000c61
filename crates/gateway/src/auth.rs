//! Gateway token lifecycle: login against the upstream provider, refresh, and
//! minting of the derived token kinds.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use stratus_auth::{
    Audience, AuthClaims, IssuedToken, JwkSet, KeySet, Signer, State, TokenError, TokenIssuer,
    TokenKind, TokenSubject, Verifier, check_audience, generate_nonce,
};
use stratus_core::ClusterId;

use crate::oidc::{OidcError, OidcProvider, UpstreamClaims};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("identity provider: {0}")]
    Upstream(#[from] OidcError),
}

impl AuthError {
    pub fn requires_reauthentication(&self) -> bool {
        match self {
            AuthError::Token(err) => err.requires_reauthentication(),
            AuthError::Upstream(_) => false,
        }
    }

    pub fn is_security_fault(&self) -> bool {
        match self {
            AuthError::Token(err) => err.is_security_fault(),
            AuthError::Upstream(_) => false,
        }
    }
}

/// First half of the login flow. The caller keeps `nonce` and presents it
/// again with the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub authorization_url: String,
    pub state: String,
    pub nonce: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: IssuedToken,
    /// Upstream refresh token, when the provider granted one.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletedLogin {
    pub session: Session,
    pub callback: String,
}

pub struct AuthService {
    provider: Arc<dyn OidcProvider>,
    issuer: TokenIssuer,
    verifier: Verifier,
    api_validity: Duration,
}

impl core::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthService")
            .field("issuer", &self.issuer)
            .field("api_validity", &self.api_validity)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    pub fn new(
        provider: Arc<dyn OidcProvider>,
        keys: &KeySet,
        issuer: &str,
        api_validity: Duration,
        kubernetes_validity: Duration,
    ) -> Result<Self, TokenError> {
        Ok(Self {
            provider,
            issuer: TokenIssuer::new(Signer::new(keys, issuer)?, kubernetes_validity),
            verifier: Verifier::new(keys, issuer)?,
            api_validity,
        })
    }

    pub fn jwks(&self) -> &JwkSet {
        self.verifier.jwks()
    }

    pub fn start_login(&self, callback: &str) -> Result<LoginRequest, TokenError> {
        let state = State::new(callback).encode()?;
        let nonce = generate_nonce();
        Ok(LoginRequest {
            authorization_url: self.provider.authorization_url(&state, &nonce),
            state,
            nonce,
        })
    }

    /// Exchanges the login code and issues an API token for the verified
    /// upstream identity.
    pub async fn complete_login(
        &self,
        code: &str,
        state: &str,
        expected_nonce: &str,
        now: DateTime<Utc>,
    ) -> Result<CompletedLogin, AuthError> {
        let state = State::decode(state)?;
        let upstream = self.provider.exchange(code).await?;
        let claims = self.provider.verify(&upstream.id_token).await?;

        if claims.nonce.as_deref() != Some(expected_nonce) {
            tracing::warn!(subject = %claims.subject, "login nonce mismatch");
            return Err(TokenError::NonceMismatch.into());
        }
        let token = self.issue_for_upstream(&claims, now)?;
        tracing::info!(email = %claims.email, jti = %token.claims.jti, "login completed");

        Ok(CompletedLogin {
            session: Session {
                token,
                refresh_token: upstream.refresh_token,
            },
            callback: state.callback,
        })
    }

    /// Re-issues an API token for the session `token` belongs to. The token may
    /// be expired but must carry a valid signature; the upstream refresh must
    /// yield the same subject.
    pub async fn refresh(
        &self,
        token: &str,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let previous = self.verifier.verify_signature(token)?;
        check_audience(&previous, &[Audience::Api])?;
        if previous.is_api_token {
            return Err(TokenError::RefreshFailed("automation tokens cannot be refreshed".into()).into());
        }

        let upstream = self
            .provider
            .refresh(refresh_token)
            .await
            .map_err(|e| TokenError::RefreshFailed(e.to_string()))?;
        let claims = self
            .provider
            .verify(&upstream.id_token)
            .await
            .map_err(|e| TokenError::RefreshFailed(e.to_string()))?;

        if claims.subject != previous.sub {
            tracing::warn!(
                previous = %previous.sub,
                refreshed = %claims.subject,
                "refreshed identity does not match session subject"
            );
            return Err(TokenError::RefreshFailed("subject changed".into()).into());
        }
        let token = self.issue_for_upstream(&claims, now)?;
        tracing::info!(email = %claims.email, jti = %token.claims.jti, "session refreshed");

        Ok(Session {
            token,
            refresh_token: upstream.refresh_token.or_else(|| Some(refresh_token.to_string())),
        })
    }

    fn issue_for_upstream(
        &self,
        claims: &UpstreamClaims,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        if !claims.email_verified {
            return Err(TokenError::EmailNotVerified);
        }
        let subject = TokenSubject::from_upstream(
            &claims.issuer,
            &claims.subject,
            claims.name.clone(),
            claims.email.trim().to_lowercase(),
            claims.email_verified,
        );
        self.issuer.issue(
            &subject,
            &TokenKind::Api {
                validity: self.api_validity,
            },
            now,
        )
    }

    /// Verifies a bearer token presented to the API.
    pub fn authenticate(&self, raw: &str, now: DateTime<Utc>) -> Result<AuthClaims, TokenError> {
        self.verifier.verify(raw, &[Audience::Api], now)
    }

    pub fn issue_api_token(
        &self,
        principal: &AuthClaims,
        scopes: Vec<String>,
        validity: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        self.issuer.issue(
            &TokenSubject::from(principal),
            &TokenKind::ApiWithScopes { scopes, validity },
            now,
        )
    }

    pub fn issue_kubernetes_token(
        &self,
        principal: &AuthClaims,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        self.issuer
            .issue(&TokenSubject::from(principal), &TokenKind::KubernetesAuth, now)
    }

    pub fn issue_cluster_bootstrap_token(
        &self,
        principal: &AuthClaims,
        cluster_id: ClusterId,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        self.issuer.issue(
            &TokenSubject::from(principal),
            &TokenKind::ClusterBootstrap { cluster_id },
            now,
        )
    }
}
