//! Login round-trip state and nonces.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::TokenError;

/// Carried through the identity provider in the OAuth `state` parameter so the
/// callback knows where to deliver the issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub callback: String,
}

impl State {
    pub fn new(callback: impl Into<String>) -> Self {
        Self {
            callback: callback.into(),
        }
    }

    /// URL-safe unpadded base64 of the JSON form.
    pub fn encode(&self) -> Result<String, TokenError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| TokenError::StateDecode(format!("serialize state: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(encoded: &str) -> Result<Self, TokenError> {
        let raw = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| TokenError::StateDecode(e.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| TokenError::StateDecode(e.to_string()))
    }
}

/// 256-bit random nonce, base64url encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_survives_round_trip() {
        let state = State::new("http://127.0.0.1:5555/callback?x=1&y=%20");
        let decoded = State::decode(&state.encode().unwrap()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn corrupt_state_fails_to_decode() {
        let encoded = State::new("http://localhost/cb").encode().unwrap();
        let truncated = &encoded[..encoded.len() - 3];
        assert!(matches!(State::decode(truncated), Err(TokenError::StateDecode(_))));
        assert!(matches!(State::decode("!!!"), Err(TokenError::StateDecode(_))));

        let not_json = URL_SAFE_NO_PAD.encode(b"callback");
        assert!(matches!(State::decode(&not_json), Err(TokenError::StateDecode(_))));
    }

    #[test]
    fn nonces_are_unique() {
        assert_ne!(generate_nonce(), generate_nonce());
        assert_eq!(generate_nonce().len(), 43);
    }
}
