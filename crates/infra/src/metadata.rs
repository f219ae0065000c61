//! Request-scoped identity metadata.
//!
//! [`DomainMetadataManager`] carries a small allow-listed set of string
//! headers (who is calling, which component sent the call) plus call-local
//! state that is never transmitted: the resolved role bindings and the
//! authorization bypass flag.

use std::collections::BTreeMap;

use tonic::metadata::{Ascii, MetadataMap, MetadataValue};

use stratus_auth::UserRoleBinding;

pub const AUTH_ID: &str = "x-auth-id";
pub const AUTH_NAME: &str = "x-auth-name";
pub const AUTH_EMAIL: &str = "x-auth-email";
pub const AUTH_ISSUER: &str = "x-auth-issuer";
pub const COMPONENT_NAME: &str = "x-component-name";
pub const COMPONENT_VERSION: &str = "x-component-version";
pub const COMPONENT_COMMIT: &str = "x-component-commit";

/// Keys that may cross a process boundary. Everything else is dropped on
/// import and never written on export.
pub const ALLOWED_KEYS: [&str; 7] = [
    AUTH_ID,
    AUTH_NAME,
    AUTH_EMAIL,
    AUTH_ISSUER,
    COMPONENT_NAME,
    COMPONENT_VERSION,
    COMPONENT_COMMIT,
];

fn allowed_key(key: &str) -> Option<&'static str> {
    ALLOWED_KEYS
        .iter()
        .copied()
        .find(|allowed| allowed.eq_ignore_ascii_case(key.trim()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInformation {
    pub id: String,
    pub name: String,
    pub email: String,
    pub issuer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentInformation {
    pub name: String,
    pub version: String,
    pub commit: String,
}

#[derive(Debug, Clone, Default)]
pub struct DomainMetadataManager {
    values: BTreeMap<&'static str, String>,
    role_bindings: Option<Vec<UserRoleBinding>>,
    authorization_bypass: bool,
}

impl DomainMetadataManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Imports only allow-listed keys (case-insensitive); later duplicates win.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut manager = Self::new();
        for (key, value) in pairs {
            if let Some(key) = allowed_key(key.as_ref()) {
                manager.values.insert(key, value.into());
            }
        }
        manager
    }

    /// Imports allow-listed ASCII entries from inbound gRPC metadata.
    pub fn from_metadata_map(map: &MetadataMap) -> Self {
        let mut manager = Self::new();
        for key in ALLOWED_KEYS {
            if let Some(value) = map.get(key).and_then(|v| v.to_str().ok()) {
                manager.values.insert(key, value.to_string());
            }
        }
        manager
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        allowed_key(key).and_then(|k| self.values.get(k).map(String::as_str))
    }

    fn set(&mut self, key: &'static str, value: &str) {
        if value.is_empty() {
            self.values.remove(key);
        } else {
            self.values.insert(key, value.to_string());
        }
    }

    fn value(&self, key: &'static str) -> String {
        self.values.get(key).cloned().unwrap_or_default()
    }

    pub fn set_user_information(&mut self, info: &UserInformation) {
        self.set(AUTH_ID, &info.id);
        self.set(AUTH_NAME, &info.name);
        self.set(AUTH_EMAIL, &info.email);
        self.set(AUTH_ISSUER, &info.issuer);
    }

    /// Absent keys come back as empty strings.
    pub fn user_information(&self) -> UserInformation {
        UserInformation {
            id: self.value(AUTH_ID),
            name: self.value(AUTH_NAME),
            email: self.value(AUTH_EMAIL),
            issuer: self.value(AUTH_ISSUER),
        }
    }

    pub fn set_user_id(&mut self, id: impl AsRef<str>) {
        self.set(AUTH_ID, id.as_ref());
    }

    pub fn set_component_information(&mut self, info: &ComponentInformation) {
        self.set(COMPONENT_NAME, &info.name);
        self.set(COMPONENT_VERSION, &info.version);
        self.set(COMPONENT_COMMIT, &info.commit);
    }

    pub fn component_information(&self) -> ComponentInformation {
        ComponentInformation {
            name: self.value(COMPONENT_NAME),
            version: self.value(COMPONENT_VERSION),
            commit: self.value(COMPONENT_COMMIT),
        }
    }

    /// Replaces the resolved bindings. Call-local only.
    pub fn set_role_bindings(&mut self, bindings: Vec<UserRoleBinding>) {
        self.role_bindings = Some(bindings);
    }

    /// `None` until identity resolution ran; `Some(&[])` for a principal
    /// without bindings.
    pub fn role_bindings(&self) -> Option<&[UserRoleBinding]> {
        self.role_bindings.as_deref()
    }

    /// Break-glass switch used by in-process callers such as startup
    /// bootstrapping. Cannot be set from inbound metadata.
    pub fn enable_authorization_bypass(&mut self) {
        self.authorization_bypass = true;
    }

    pub fn authorization_bypass(&self) -> bool {
        self.authorization_bypass
    }

    /// The allow-listed entries, in key order.
    pub fn outgoing_metadata(&self) -> BTreeMap<&'static str, String> {
        self.values.clone()
    }

    /// Writes the allow-listed entries into outbound gRPC metadata. Values
    /// that are not valid ASCII metadata are skipped.
    pub fn write_to(&self, map: &mut MetadataMap) {
        for (key, value) in &self.values {
            match value.parse::<MetadataValue<Ascii>>() {
                Ok(value) => {
                    map.insert(*key, value);
                }
                Err(_) => tracing::warn!(key, "skipping metadata value that is not valid ASCII"),
            }
        }
    }
}
