use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};

use crate::app::dto::{
    ApiTokenRequest, CallbackRequest, LoginQuery, LoginResponse, RefreshRequest, SessionResponse,
    TokenResponse,
};
use crate::app::errors;
use crate::app::services::GatewayServices;
use crate::context::Principal;

pub async fn login(
    Extension(services): Extension<Arc<GatewayServices>>,
    Query(query): Query<LoginQuery>,
) -> Result<Json<LoginResponse>, axum::response::Response> {
    let login = services
        .auth
        .start_login(&query.callback)
        .map_err(errors::token_error_to_response)?;
    Ok(Json(LoginResponse {
        authorization_url: login.authorization_url,
        state: login.state,
        nonce: login.nonce,
    }))
}

pub async fn callback(
    Extension(services): Extension<Arc<GatewayServices>>,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<SessionResponse>, axum::response::Response> {
    let done = services
        .auth
        .complete_login(&req.code, &req.state, &req.nonce, Utc::now())
        .await
        .map_err(errors::auth_error_to_response)?;
    Ok(Json(SessionResponse::from_session(
        done.session,
        Some(done.callback),
    )))
}

pub async fn refresh(
    Extension(services): Extension<Arc<GatewayServices>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<SessionResponse>, axum::response::Response> {
    let session = services
        .auth
        .refresh(&req.token, &req.refresh_token, Utc::now())
        .await
        .map_err(errors::auth_error_to_response)?;
    Ok(Json(SessionResponse::from_session(session, None)))
}

/// Mints a derived token for the caller. Only interactive sessions may do so.
pub async fn api_tokens(
    Extension(services): Extension<Arc<GatewayServices>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<ApiTokenRequest>,
) -> axum::response::Response {
    if principal.claims().is_api_token {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "interactive_session_required",
            "derived tokens cannot mint further tokens",
        );
    }

    let now = Utc::now();
    let issued = match req {
        ApiTokenRequest::Scoped {
            scopes,
            validity_secs,
        } => services.auth.issue_api_token(
            principal.claims(),
            scopes,
            Duration::seconds(validity_secs),
            now,
        ),
        ApiTokenRequest::Kubernetes => services.auth.issue_kubernetes_token(principal.claims(), now),
        ApiTokenRequest::ClusterBootstrap { cluster_id } => services
            .auth
            .issue_cluster_bootstrap_token(principal.claims(), cluster_id, now),
    };

    match issued {
        Ok(issued) => {
            tracing::info!(
                email = %principal.email(),
                aud = %issued.claims.aud,
                jti = %issued.claims.jti,
                "derived token issued"
            );
            (StatusCode::CREATED, Json(TokenResponse::from(issued))).into_response()
        }
        Err(err) => errors::token_error_to_response(err),
    }
}
