//! Wire decoding of control-plane commands.
//!
//! Commands arrive as a [`CommandEnvelope`]: a type tag plus an opaque JSON
//! payload. The [`CommandRegistry`] maps each tag to a decode function and is
//! built once at startup; decoding validates the payload before any
//! authorization runs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use stratus_auth::Policy;
use stratus_clusters::{ClusterCommand, CreateCluster, DeleteCluster, UpdateCluster};
use stratus_core::{AggregateId, DomainError};
use stratus_events::Command;
use stratus_tenants::{CreateTenant, DeleteTenant, TenantCommand, UpdateTenant};
use stratus_users::{
    CreateUser, CreateUserRoleBinding, DeleteUser, DeleteUserRoleBinding, UpdateUser, UserCommand,
};

/// Every command the control plane executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlPlaneCommand {
    User(UserCommand),
    Tenant(TenantCommand),
    Cluster(ClusterCommand),
}

impl ControlPlaneCommand {
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            ControlPlaneCommand::User(cmd) => cmd.validate(),
            ControlPlaneCommand::Tenant(cmd) => cmd.validate(),
            ControlPlaneCommand::Cluster(cmd) => cmd.validate(),
        }
    }

    /// The type-specific payload as it travels inside an envelope.
    pub fn payload(&self) -> Result<JsonValue, serde_json::Error> {
        match self {
            ControlPlaneCommand::User(cmd) => match cmd {
                UserCommand::Create(c) => serde_json::to_value(c),
                UserCommand::Update(c) => serde_json::to_value(c),
                UserCommand::Delete(c) => serde_json::to_value(c),
                UserCommand::CreateRoleBinding(c) => serde_json::to_value(c),
                UserCommand::DeleteRoleBinding(c) => serde_json::to_value(c),
            },
            ControlPlaneCommand::Tenant(cmd) => match cmd {
                TenantCommand::Create(c) => serde_json::to_value(c),
                TenantCommand::Update(c) => serde_json::to_value(c),
                TenantCommand::Delete(c) => serde_json::to_value(c),
            },
            ControlPlaneCommand::Cluster(cmd) => match cmd {
                ClusterCommand::Create(c) => serde_json::to_value(c),
                ClusterCommand::Update(c) => serde_json::to_value(c),
                ClusterCommand::Delete(c) => serde_json::to_value(c),
            },
        }
    }
}

macro_rules! delegate {
    ($self:ident, $method:ident) => {
        match $self {
            ControlPlaneCommand::User(cmd) => cmd.$method(),
            ControlPlaneCommand::Tenant(cmd) => cmd.$method(),
            ControlPlaneCommand::Cluster(cmd) => cmd.$method(),
        }
    };
}

impl Command for ControlPlaneCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        delegate!(self, target_aggregate_id)
    }

    fn aggregate_type(&self) -> &'static str {
        delegate!(self, aggregate_type)
    }

    fn command_type(&self) -> &'static str {
        delegate!(self, command_type)
    }

    fn policies(&self) -> Vec<Policy> {
        delegate!(self, policies)
    }
}

impl From<UserCommand> for ControlPlaneCommand {
    fn from(value: UserCommand) -> Self {
        ControlPlaneCommand::User(value)
    }
}

impl From<TenantCommand> for ControlPlaneCommand {
    fn from(value: TenantCommand) -> Self {
        ControlPlaneCommand::Tenant(value)
    }
}

impl From<ClusterCommand> for ControlPlaneCommand {
    fn from(value: ClusterCommand) -> Self {
        ControlPlaneCommand::Cluster(value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub command_type: String,
    #[serde(default)]
    pub payload: JsonValue,
}

impl CommandEnvelope {
    pub fn from_command(command: &ControlPlaneCommand) -> Result<Self, serde_json::Error> {
        Ok(Self {
            aggregate_id: command.target_aggregate_id(),
            aggregate_type: command.aggregate_type().to_string(),
            command_type: command.command_type().to_string(),
            payload: command.payload()?,
        })
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown command type '{0}'")]
    UnknownCommandType(String),

    #[error("command type '{0}' is already registered")]
    DuplicateRegistration(String),

    #[error("command type '{command_type}' targets '{expected}' aggregates, envelope names '{found}'")]
    AggregateTypeMismatch {
        command_type: String,
        expected: &'static str,
        found: String,
    },

    #[error("payload of '{command_type}' does not decode: {source}")]
    Payload {
        command_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload targets aggregate {found}, envelope names {expected}")]
    AggregateIdMismatch {
        expected: AggregateId,
        found: AggregateId,
    },

    #[error(transparent)]
    Invalid(#[from] DomainError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

pub type DecodeFn = fn(JsonValue) -> Result<ControlPlaneCommand, serde_json::Error>;

#[derive(Clone, Copy)]
struct Registration {
    aggregate_type: &'static str,
    decode: DecodeFn,
}

#[derive(Default)]
pub struct CommandRegistry {
    entries: HashMap<&'static str, Registration>,
}

impl core::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("command_types", &self.command_types())
            .finish()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every user, tenant and cluster command.
    pub fn with_defaults() -> Self {
        let defaults: [(&'static str, &'static str, DecodeFn); 11] = [
            ("user.create", stratus_users::AGGREGATE_TYPE, |v| {
                serde_json::from_value::<CreateUser>(v).map(|c| UserCommand::Create(c).into())
            }),
            ("user.update", stratus_users::AGGREGATE_TYPE, |v| {
                serde_json::from_value::<UpdateUser>(v).map(|c| UserCommand::Update(c).into())
            }),
            ("user.delete", stratus_users::AGGREGATE_TYPE, |v| {
                serde_json::from_value::<DeleteUser>(v).map(|c| UserCommand::Delete(c).into())
            }),
            ("user.role_binding.create", stratus_users::AGGREGATE_TYPE, |v| {
                serde_json::from_value::<CreateUserRoleBinding>(v)
                    .map(|c| UserCommand::CreateRoleBinding(c).into())
            }),
            ("user.role_binding.delete", stratus_users::AGGREGATE_TYPE, |v| {
                serde_json::from_value::<DeleteUserRoleBinding>(v)
                    .map(|c| UserCommand::DeleteRoleBinding(c).into())
            }),
            ("tenant.create", stratus_tenants::AGGREGATE_TYPE, |v| {
                serde_json::from_value::<CreateTenant>(v).map(|c| TenantCommand::Create(c).into())
            }),
            ("tenant.update", stratus_tenants::AGGREGATE_TYPE, |v| {
                serde_json::from_value::<UpdateTenant>(v).map(|c| TenantCommand::Update(c).into())
            }),
            ("tenant.delete", stratus_tenants::AGGREGATE_TYPE, |v| {
                serde_json::from_value::<DeleteTenant>(v).map(|c| TenantCommand::Delete(c).into())
            }),
            ("cluster.create", stratus_clusters::AGGREGATE_TYPE, |v| {
                serde_json::from_value::<CreateCluster>(v)
                    .map(|c| ClusterCommand::Create(c).into())
            }),
            ("cluster.update", stratus_clusters::AGGREGATE_TYPE, |v| {
                serde_json::from_value::<UpdateCluster>(v)
                    .map(|c| ClusterCommand::Update(c).into())
            }),
            ("cluster.delete", stratus_clusters::AGGREGATE_TYPE, |v| {
                serde_json::from_value::<DeleteCluster>(v)
                    .map(|c| ClusterCommand::Delete(c).into())
            }),
        ];

        let mut registry = Self::new();
        for (command_type, aggregate_type, decode) in defaults {
            registry.entries.insert(
                command_type,
                Registration {
                    aggregate_type,
                    decode,
                },
            );
        }
        registry
    }

    pub fn register(
        &mut self,
        command_type: &'static str,
        aggregate_type: &'static str,
        decode: DecodeFn,
    ) -> Result<(), DecodeError> {
        if self.entries.contains_key(command_type) {
            return Err(DecodeError::DuplicateRegistration(command_type.to_string()));
        }
        self.entries.insert(
            command_type,
            Registration {
                aggregate_type,
                decode,
            },
        );
        Ok(())
    }

    pub fn command_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.entries.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Decodes and validates an envelope. The decoded command must target the
    /// aggregate and aggregate type the envelope names.
    pub fn decode(&self, envelope: CommandEnvelope) -> Result<ControlPlaneCommand, DecodeError> {
        let registration = self
            .entries
            .get(envelope.command_type.as_str())
            .copied()
            .ok_or_else(|| DecodeError::UnknownCommandType(envelope.command_type.clone()))?;

        if registration.aggregate_type != envelope.aggregate_type {
            return Err(DecodeError::AggregateTypeMismatch {
                command_type: envelope.command_type,
                expected: registration.aggregate_type,
                found: envelope.aggregate_type,
            });
        }

        let command = (registration.decode)(envelope.payload).map_err(|source| {
            DecodeError::Payload {
                command_type: envelope.command_type.clone(),
                source,
            }
        })?;
        command.validate()?;

        let found = command.target_aggregate_id();
        if found != envelope.aggregate_id {
            return Err(DecodeError::AggregateIdMismatch {
                expected: envelope.aggregate_id,
                found,
            });
        }
        Ok(command)
    }
}
