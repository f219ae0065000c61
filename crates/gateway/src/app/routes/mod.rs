use axum::{
    Router,
    routing::{get, post},
};

pub mod auth;
pub mod commands;
pub mod system;

/// Endpoints reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", post(auth::callback))
        .route("/auth/refresh", post(auth::refresh))
}

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/auth/api-tokens", post(auth::api_tokens))
        .route("/commands", post(commands::execute))
}
