//! Signing and verification of gateway-issued JWTs (EdDSA only).

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::claims::ClaimsTimeError;
use crate::keys::{JwkSet, KeySet};
use crate::{Audience, AuthClaims};

/// Every way obtaining, verifying or refreshing a token can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("token audience '{found}' is not accepted here")]
    AudienceMismatch { found: String },

    #[error("token issuer is not trusted")]
    IssuerMismatch,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("nonce mismatch")]
    NonceMismatch,

    #[error("could not decode login state: {0}")]
    StateDecode(String),

    #[error("email address is not verified by the identity provider")]
    EmailNotVerified,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("token validity must be positive")]
    InvalidValidity,

    #[error("key error: {0}")]
    Key(String),
}

impl TokenError {
    /// The caller should discard its credentials and log in again.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, TokenError::Expired | TokenError::RefreshFailed(_))
    }

    /// Evidence of tampering or replay rather than an ordinary lapse.
    pub fn is_security_fault(&self) -> bool {
        matches!(
            self,
            TokenError::InvalidSignature | TokenError::NonceMismatch | TokenError::IssuerMismatch
        )
    }
}

impl From<ClaimsTimeError> for TokenError {
    fn from(value: ClaimsTimeError) -> Self {
        match value {
            ClaimsTimeError::Expired => TokenError::Expired,
            ClaimsTimeError::NotYetValid => TokenError::NotYetValid,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName => TokenError::InvalidSignature,
            ErrorKind::InvalidIssuer => TokenError::IssuerMismatch,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::ImmatureSignature => TokenError::NotYetValid,
            _ => TokenError::Malformed(value.to_string()),
        }
    }
}

/// Signs claims with the current key of a [`KeySet`].
pub struct Signer {
    kid: String,
    key: EncodingKey,
    issuer: String,
}

impl core::fmt::Debug for Signer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signer")
            .field("kid", &self.kid)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(keys: &KeySet, issuer: impl Into<String>) -> Result<Self, TokenError> {
        Ok(Self {
            kid: keys.current.kid.clone(),
            key: keys.current.encoding_key()?,
            issuer: issuer.into(),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn generate_signed_token(&self, claims: &AuthClaims) -> Result<String, TokenError> {
        let mut header = Header::new(jsonwebtoken::Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());
        Ok(jsonwebtoken::encode(&header, claims, &self.key)?)
    }
}

/// Verifies gateway tokens against the current and retired keys.
pub struct Verifier {
    issuer: String,
    keys: Vec<(String, DecodingKey)>,
    jwks: JwkSet,
}

impl core::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Verifier")
            .field("issuer", &self.issuer)
            .field("jwks", &self.jwks)
            .finish_non_exhaustive()
    }
}

impl Verifier {
    pub fn new(keys: &KeySet, issuer: impl Into<String>) -> Result<Self, TokenError> {
        let mut decoding = Vec::new();
        let mut jwks = JwkSet::default();
        for key in keys.all_keys() {
            decoding.push((key.kid.clone(), key.decoding_key()?));
            jwks.keys.push(key.to_jwk());
        }
        Ok(Self {
            issuer: issuer.into(),
            keys: decoding,
            jwks,
        })
    }

    /// Public keys in JWK Set form.
    pub fn jwks(&self) -> &JwkSet {
        &self.jwks
    }

    /// Full verification, checked in this order: signature and issuer,
    /// audience, expiry, not-before.
    ///
    /// `accepted` lists the audiences this call site takes; an empty list
    /// accepts nothing.
    pub fn verify(
        &self,
        raw: &str,
        accepted: &[Audience],
        now: DateTime<Utc>,
    ) -> Result<AuthClaims, TokenError> {
        let claims = self.verify_signature(raw)?;
        check_audience(&claims, accepted)?;
        claims.check_time_window(now)?;
        Ok(claims)
    }

    /// Signature and issuer only. Used on the refresh path where an expired
    /// token is still proof of the earlier session.
    pub fn verify_signature(&self, raw: &str) -> Result<AuthClaims, TokenError> {
        let header = jsonwebtoken::decode_header(raw)?;

        let mut ordered: Vec<&(String, DecodingKey)> = Vec::with_capacity(self.keys.len());
        match header.kid.as_deref() {
            Some(kid) => {
                ordered.extend(self.keys.iter().filter(|(k, _)| k == kid));
                ordered.extend(self.keys.iter().filter(|(k, _)| k != kid));
            }
            None => ordered.extend(self.keys.iter()),
        }

        let mut validation = Validation::new(jsonwebtoken::Algorithm::EdDSA);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);

        for (_, key) in ordered {
            match jsonwebtoken::decode::<AuthClaims>(raw, key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(err) if matches!(err.kind(), ErrorKind::InvalidSignature) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(TokenError::InvalidSignature)
    }
}

pub fn check_audience(claims: &AuthClaims, accepted: &[Audience]) -> Result<(), TokenError> {
    match claims.audience() {
        Some(aud) if accepted.contains(&aud) => Ok(()),
        _ => Err(TokenError::AudienceMismatch {
            found: claims.aud.clone(),
        }),
    }
}
