//! `stratus-gateway`: the authenticated edge of the control plane.
//!
//! Issues and verifies gateway tokens derived from upstream OIDC identities,
//! and feeds authenticated commands into the authorized command pipeline over
//! HTTP (axum) or gRPC metadata (tonic).

pub mod app;
pub mod auth;
pub mod backoff;
pub mod bootstrap;
pub mod client;
pub mod config;
pub mod context;
pub mod grpc;
pub mod middleware;
pub mod oidc;
