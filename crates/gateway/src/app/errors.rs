use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stratus_auth::TokenError;
use stratus_infra::{DispatchError, PipelineError, RepositoryError};

use crate::auth::AuthError;

pub fn pipeline_error_to_response(err: PipelineError) -> axum::response::Response {
    match err {
        PipelineError::Unauthenticated(msg) => {
            json_error(StatusCode::UNAUTHORIZED, "unauthenticated", msg)
        }
        PipelineError::Unauthorized => {
            json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized")
        }
        PipelineError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        PipelineError::Cancelled => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "cancelled", "call cancelled")
        }
        PipelineError::DeadlineExceeded => json_error(
            StatusCode::GATEWAY_TIMEOUT,
            "deadline_exceeded",
            "deadline exceeded",
        ),
        PipelineError::Repository(RepositoryError::UserNotFound) => {
            json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized")
        }
        PipelineError::Repository(RepositoryError::Unavailable(msg)) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "repository_unavailable", msg)
        }
        PipelineError::Dispatch(err) => dispatch_error_to_response(err),
    }
}

fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized"),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::CorruptStream(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "corrupt_stream", msg)
        }
        DispatchError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
    }
}

/// Stable error code for each token failure; clients branch on it.
pub fn token_error_code(err: &TokenError) -> &'static str {
    match err {
        TokenError::InvalidSignature => "invalid_signature",
        TokenError::Expired => "expired",
        TokenError::NotYetValid => "not_yet_valid",
        TokenError::AudienceMismatch { .. } => "audience_mismatch",
        TokenError::IssuerMismatch => "issuer_mismatch",
        TokenError::Malformed(_) => "malformed_token",
        TokenError::NonceMismatch => "nonce_mismatch",
        TokenError::StateDecode(_) => "invalid_state",
        TokenError::EmailNotVerified => "email_not_verified",
        TokenError::RefreshFailed(_) => "refresh_failed",
        TokenError::InvalidValidity => "invalid_validity",
        TokenError::Key(_) => "key_error",
    }
}

pub fn token_error_to_response(err: TokenError) -> axum::response::Response {
    let status = match &err {
        TokenError::StateDecode(_) | TokenError::InvalidValidity => StatusCode::BAD_REQUEST,
        TokenError::EmailNotVerified => StatusCode::FORBIDDEN,
        TokenError::Key(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::UNAUTHORIZED,
    };
    json_error(status, token_error_code(&err), err.to_string())
}

pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::Token(err) => token_error_to_response(err),
        AuthError::Upstream(err) => {
            tracing::warn!(error = %err, "identity provider call failed");
            json_error(StatusCode::BAD_GATEWAY, "upstream_error", err.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authn_and_authz_failures_use_distinct_statuses() {
        let authn = pipeline_error_to_response(PipelineError::Unauthenticated("expired".into()));
        let authz = pipeline_error_to_response(PipelineError::Unauthorized);
        let unknown =
            pipeline_error_to_response(PipelineError::Repository(RepositoryError::UserNotFound));
        assert_eq!(authn.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(authz.status(), StatusCode::FORBIDDEN);
        assert_eq!(unknown.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn token_failures_map_to_statuses() {
        assert_eq!(
            token_error_to_response(TokenError::Expired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            token_error_to_response(TokenError::StateDecode("bad".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            token_error_to_response(TokenError::EmailNotVerified).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn dispatch_errors_keep_their_meaning() {
        let conflict = pipeline_error_to_response(PipelineError::Dispatch(
            DispatchError::Concurrency("stale".into()),
        ));
        let missing = pipeline_error_to_response(PipelineError::Dispatch(DispatchError::NotFound));
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
