//! Ed25519 signing key material and its JWK representation.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::TokenError;

pub const ED25519_SEED_LEN: usize = 32;

/// One Ed25519 key pair identified by `kid`.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    private_key: [u8; ED25519_SEED_LEN],
    pub public_key: [u8; ED25519_SEED_LEN],
}

impl core::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("public_key", &URL_SAFE_NO_PAD.encode(self.public_key))
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    pub fn from_seed(kid: impl Into<String>, seed: [u8; ED25519_SEED_LEN]) -> Self {
        let public_key = Ed25519SigningKey::from_bytes(&seed)
            .verifying_key()
            .to_bytes();
        Self {
            kid: kid.into(),
            private_key: seed,
            public_key,
        }
    }

    /// Decodes a standard-base64 32-byte seed (the `STRATUS_SIGNING_KEY` format).
    pub fn from_base64_seed(kid: impl Into<String>, encoded: &str) -> Result<Self, TokenError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| TokenError::Key(format!("signing seed is not base64: {e}")))?;
        let seed: [u8; ED25519_SEED_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            TokenError::Key(format!(
                "signing seed must be {ED25519_SEED_LEN} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self::from_seed(kid, seed))
    }

    /// Fresh random key, for development and tests.
    pub fn generate(kid: impl Into<String>) -> Self {
        let mut seed = [0u8; ED25519_SEED_LEN];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::from_seed(kid, seed)
    }

    pub(crate) fn encoding_key(&self) -> Result<EncodingKey, TokenError> {
        let der = Ed25519SigningKey::from_bytes(&self.private_key)
            .to_pkcs8_der()
            .map_err(|e| TokenError::Key(format!("encode Ed25519 key: {e}")))?;
        Ok(EncodingKey::from_ed_der(der.as_bytes()))
    }

    pub(crate) fn decoding_key(&self) -> Result<DecodingKey, TokenError> {
        let x = URL_SAFE_NO_PAD.encode(self.public_key);
        DecodingKey::from_ed_components(&x)
            .map_err(|e| TokenError::Key(format!("decode Ed25519 public key: {e}")))
    }

    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: "OKP".to_string(),
            kid: self.kid.clone(),
            alg: "EdDSA".to_string(),
            use_field: "sig".to_string(),
            crv: "Ed25519".to_string(),
            x: URL_SAFE_NO_PAD.encode(self.public_key),
        }
    }
}

/// Current signing key plus retired keys still accepted during rotation.
#[derive(Debug, Clone)]
pub struct KeySet {
    pub current: SigningKey,
    pub previous: Vec<SigningKey>,
}

impl KeySet {
    pub fn new(current: SigningKey) -> Self {
        Self {
            current,
            previous: Vec::new(),
        }
    }

    /// Makes `next` current and retires the old current key.
    pub fn rotate(&mut self, next: SigningKey) {
        let retired = std::mem::replace(&mut self.current, next);
        self.previous.insert(0, retired);
    }

    pub fn all_keys(&self) -> impl Iterator<Item = &SigningKey> {
        std::iter::once(&self.current).chain(self.previous.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_field: String,
    pub crv: String,
    pub x: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}
