use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::dto::WhoAmIResponse;
use crate::app::services::GatewayServices;
use crate::context::Principal;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(services): Extension<Arc<GatewayServices>>,
    Extension(principal): Extension<Principal>,
) -> impl IntoResponse {
    let user = services.users.get_by_email(principal.email());
    Json(WhoAmIResponse {
        subject: principal.claims().sub.clone(),
        email: principal.email().to_string(),
        name: principal.claims().name.clone(),
        issuer: principal.upstream_issuer().to_string(),
        user_id: user.as_ref().map(|u| u.user_id),
        role_bindings: user.map(|u| u.role_bindings).unwrap_or_default(),
    })
}
