//! Gateway configuration, read from `STRATUS_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

use stratus_auth::{KeySet, SigningKey};
use stratus_infra::ComponentInformation;
use stratus_observability::LogFormat;

pub const LISTEN_ADDR: &str = "STRATUS_LISTEN_ADDR";
pub const ISSUER: &str = "STRATUS_ISSUER";
pub const SIGNING_KEY: &str = "STRATUS_SIGNING_KEY";
pub const SIGNING_KEY_ID: &str = "STRATUS_SIGNING_KEY_ID";
pub const PREVIOUS_SIGNING_KEY: &str = "STRATUS_PREVIOUS_SIGNING_KEY";
pub const PREVIOUS_SIGNING_KEY_ID: &str = "STRATUS_PREVIOUS_SIGNING_KEY_ID";
pub const API_TOKEN_VALIDITY_SECS: &str = "STRATUS_API_TOKEN_VALIDITY_SECS";
pub const KUBERNETES_TOKEN_VALIDITY_SECS: &str = "STRATUS_KUBERNETES_TOKEN_VALIDITY_SECS";
pub const OIDC_ISSUER: &str = "STRATUS_OIDC_ISSUER";
pub const OIDC_CLIENT_ID: &str = "STRATUS_OIDC_CLIENT_ID";
pub const OIDC_CLIENT_SECRET: &str = "STRATUS_OIDC_CLIENT_SECRET";
pub const OIDC_REDIRECT_URL: &str = "STRATUS_OIDC_REDIRECT_URL";
pub const OIDC_DISCOVERY_RETRIES: &str = "STRATUS_OIDC_DISCOVERY_RETRIES";
pub const OIDC_DISCOVERY_DELAY_MS: &str = "STRATUS_OIDC_DISCOVERY_DELAY_MS";
pub const BOOTSTRAP_ADMIN_EMAIL: &str = "STRATUS_BOOTSTRAP_ADMIN_EMAIL";
pub const LOG_FORMAT: &str = "STRATUS_LOG_FORMAT";
pub const COMPONENT_NAME: &str = "STRATUS_COMPONENT_NAME";
pub const COMPONENT_COMMIT: &str = "STRATUS_COMMIT";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_ISSUER: &str = "http://localhost:8080";
const DEFAULT_KEY_ID: &str = "stratus-1";
const DEFAULT_API_VALIDITY_SECS: i64 = 60 * 60;
const DEFAULT_KUBERNETES_VALIDITY_SECS: i64 = 8 * 60 * 60;
const DEFAULT_OIDC_ISSUER: &str = "http://localhost:5556/dex";
const DEFAULT_OIDC_CLIENT_ID: &str = "stratus";
const DEFAULT_OIDC_REDIRECT_URL: &str = "http://localhost:8080/auth/callback";
const DEFAULT_DISCOVERY_RETRIES: u32 = 5;
const DEFAULT_DISCOVERY_DELAY_MS: u64 = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    /// Discovery attempts after the first failure.
    pub discovery_retries: u32,
    pub discovery_initial_delay: StdDuration,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub issuer: String,
    pub keys: KeySet,
    pub api_token_validity: Duration,
    pub kubernetes_token_validity: Duration,
    pub oidc: OidcConfig,
    pub bootstrap_admin_email: Option<String>,
    pub log_format: LogFormat,
    pub component: ComponentInformation,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let listen_addr = get(LISTEN_ADDR)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid(LISTEN_ADDR, e.to_string()))?;

        let issuer = get(ISSUER).unwrap_or_else(|| DEFAULT_ISSUER.to_string());

        let key_id = get(SIGNING_KEY_ID).unwrap_or_else(|| DEFAULT_KEY_ID.to_string());
        let current = match get(SIGNING_KEY) {
            Some(seed) => SigningKey::from_base64_seed(key_id, &seed)
                .map_err(|e| ConfigError::invalid(SIGNING_KEY, e.to_string()))?,
            None => {
                tracing::warn!(
                    "{SIGNING_KEY} not set; using an ephemeral signing key, issued tokens will not survive a restart"
                );
                SigningKey::generate(key_id)
            }
        };
        let mut keys = KeySet::new(current);
        if let Some(seed) = get(PREVIOUS_SIGNING_KEY) {
            let kid = get(PREVIOUS_SIGNING_KEY_ID).ok_or_else(|| {
                ConfigError::invalid(PREVIOUS_SIGNING_KEY_ID, "required with a previous key")
            })?;
            let previous = SigningKey::from_base64_seed(kid, &seed)
                .map_err(|e| ConfigError::invalid(PREVIOUS_SIGNING_KEY, e.to_string()))?;
            if previous.kid == keys.current.kid {
                return Err(ConfigError::invalid(
                    PREVIOUS_SIGNING_KEY_ID,
                    "must differ from the current key id",
                ));
            }
            keys.previous.push(previous);
        }

        let api_token_validity =
            validity(get(API_TOKEN_VALIDITY_SECS), API_TOKEN_VALIDITY_SECS, DEFAULT_API_VALIDITY_SECS)?;
        let kubernetes_token_validity = validity(
            get(KUBERNETES_TOKEN_VALIDITY_SECS),
            KUBERNETES_TOKEN_VALIDITY_SECS,
            DEFAULT_KUBERNETES_VALIDITY_SECS,
        )?;

        let client_secret = get(OIDC_CLIENT_SECRET).unwrap_or_else(|| {
            tracing::warn!("{OIDC_CLIENT_SECRET} not set; the identity provider will likely reject code exchange");
            String::new()
        });
        let oidc = OidcConfig {
            issuer: get(OIDC_ISSUER).unwrap_or_else(|| DEFAULT_OIDC_ISSUER.to_string()),
            client_id: get(OIDC_CLIENT_ID).unwrap_or_else(|| DEFAULT_OIDC_CLIENT_ID.to_string()),
            client_secret,
            redirect_url: get(OIDC_REDIRECT_URL)
                .unwrap_or_else(|| DEFAULT_OIDC_REDIRECT_URL.to_string()),
            discovery_retries: parse_or(get(OIDC_DISCOVERY_RETRIES), OIDC_DISCOVERY_RETRIES, DEFAULT_DISCOVERY_RETRIES)?,
            discovery_initial_delay: StdDuration::from_millis(parse_or(
                get(OIDC_DISCOVERY_DELAY_MS),
                OIDC_DISCOVERY_DELAY_MS,
                DEFAULT_DISCOVERY_DELAY_MS,
            )?),
        };

        let log_format = match get(LOG_FORMAT) {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::invalid(LOG_FORMAT, e.to_string()))?,
            None => LogFormat::default(),
        };

        let bootstrap_admin_email = get(BOOTSTRAP_ADMIN_EMAIL).map(|e| e.to_lowercase());

        let component = ComponentInformation {
            name: get(COMPONENT_NAME).unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: get(COMPONENT_COMMIT).unwrap_or_else(|| "unknown".to_string()),
        };

        Ok(Self {
            listen_addr,
            issuer,
            keys,
            api_token_validity,
            kubernetes_token_validity,
            oidc,
            bootstrap_admin_email,
            log_format,
            component,
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::invalid(key, format!("'{raw}': {e}"))),
        None => Ok(default),
    }
}

fn validity(raw: Option<String>, key: &'static str, default_secs: i64) -> Result<Duration, ConfigError> {
    let secs = parse_or(raw, key, default_secs)?;
    if secs <= 0 {
        return Err(ConfigError::invalid(key, "must be a positive number of seconds"));
    }
    Ok(Duration::seconds(secs))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| env.get(key).cloned())
    }

    // 32 bytes of 0x07, standard base64.
    const SEED: &str = "BwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwc=";

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.api_token_validity, Duration::hours(1));
        assert_eq!(cfg.kubernetes_token_validity, Duration::hours(8));
        assert_eq!(cfg.oidc.discovery_retries, 5);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.component.name, "stratus-gateway");
        assert!(cfg.bootstrap_admin_email.is_none());
        assert!(cfg.keys.previous.is_empty());
    }

    #[test]
    fn signing_seed_is_deterministic() {
        let a = config(&[(SIGNING_KEY, SEED)]).unwrap();
        let b = config(&[(SIGNING_KEY, SEED), (SIGNING_KEY_ID, "stratus-1")]).unwrap();
        assert_eq!(a.keys.current.public_key, b.keys.current.public_key);
    }

    #[test]
    fn previous_key_requires_distinct_id() {
        let err = config(&[
            (SIGNING_KEY, SEED),
            (PREVIOUS_SIGNING_KEY, SEED),
            (PREVIOUS_SIGNING_KEY_ID, "stratus-1"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key, .. } if key == PREVIOUS_SIGNING_KEY_ID));

        let cfg = config(&[
            (SIGNING_KEY, SEED),
            (PREVIOUS_SIGNING_KEY, SEED),
            (PREVIOUS_SIGNING_KEY_ID, "stratus-0"),
        ])
        .unwrap();
        assert_eq!(cfg.keys.previous.len(), 1);
    }

    #[test]
    fn bad_values_name_their_key() {
        let cases = [
            (LISTEN_ADDR, "not-an-addr"),
            (SIGNING_KEY, "%%%"),
            (API_TOKEN_VALIDITY_SECS, "0"),
            (KUBERNETES_TOKEN_VALIDITY_SECS, "soon"),
            (OIDC_DISCOVERY_RETRIES, "-1"),
            (LOG_FORMAT, "xml"),
        ];
        for (key, value) in cases {
            match config(&[(key, value)]) {
                Err(ConfigError::Invalid { key: found, .. }) => assert_eq!(found, key),
                Ok(_) => panic!("{key}={value} was accepted"),
            }
        }
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = config(&[(LISTEN_ADDR, "  "), (BOOTSTRAP_ADMIN_EMAIL, "")]).unwrap();
        assert_eq!(cfg.listen_addr.port(), 8080);
        assert!(cfg.bootstrap_admin_email.is_none());
    }

    #[test]
    fn bootstrap_email_is_normalized() {
        let cfg = config(&[(BOOTSTRAP_ADMIN_EMAIL, "Root@Example.COM")]).unwrap();
        assert_eq!(cfg.bootstrap_admin_email.as_deref(), Some("root@example.com"));
    }
}
