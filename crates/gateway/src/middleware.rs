use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::app::errors::{json_error, token_error_to_response};
use crate::auth::AuthService;
use crate::context::Principal;

#[derive(Clone)]
pub struct AuthState {
    pub auth: Arc<AuthService>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).ok_or_else(|| {
        json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "missing bearer token",
        )
    })?;

    let claims = state.auth.authenticate(token, Utc::now()).map_err(|err| {
        if err.is_security_fault() {
            tracing::warn!(error = %err, "rejected forged or foreign token");
        } else {
            tracing::debug!(error = %err, "rejected bearer token");
        }
        token_error_to_response(err)
    })?;

    req.extensions_mut().insert(Principal::new(claims));
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    bearer_token(header.to_str().ok()?)
}

/// Token of an `Authorization: Bearer <token>` value; the scheme is matched
/// case-insensitively.
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
