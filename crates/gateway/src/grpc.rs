//! gRPC edge helpers: bearer authentication and call-context propagation over
//! tonic metadata.

use std::time::Instant;

use chrono::Utc;
use tonic::metadata::MetadataMap;
use tonic::{Request, Status};

use stratus_infra::{CallContext, ComponentInformation, DomainMetadataManager};

use crate::auth::AuthService;
use crate::context::Principal;
use crate::middleware::bearer_token;

pub fn bearer_from_metadata(metadata: &MetadataMap) -> Result<&str, Status> {
    metadata
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| Status::unauthenticated("missing bearer token"))
}

/// Verifies the caller's token. Identity headers sent by the caller are
/// ignored at this edge.
pub fn authenticate<T>(auth: &AuthService, request: &Request<T>) -> Result<Principal, Status> {
    let token = bearer_from_metadata(request.metadata())?;
    auth.authenticate(token, Utc::now())
        .map(Principal::new)
        .map_err(|err| Status::unauthenticated(err.to_string()))
}

/// Context for a call entering through the gateway.
pub fn edge_context<T>(
    auth: &AuthService,
    component: &ComponentInformation,
    request: &Request<T>,
) -> Result<CallContext, Status> {
    Ok(authenticate(auth, request)?.call_context(component))
}

/// Context for a call from another control-plane component, which has
/// already authenticated the principal. Only allow-listed headers are taken.
pub fn internal_context<T>(request: &Request<T>) -> CallContext {
    CallContext::new(DomainMetadataManager::from_metadata_map(request.metadata()))
}

/// Outbound request carrying the allow-listed identity headers and the
/// remaining deadline of `ctx`.
pub fn outgoing_request<T>(ctx: &CallContext, message: T) -> Request<T> {
    let mut request = Request::new(message);
    ctx.metadata().write_to(request.metadata_mut());
    if let Some(deadline) = ctx.deadline() {
        request.set_timeout(deadline.saturating_duration_since(Instant::now()));
    }
    request
}
