use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, Json};

use stratus_infra::{CommandEnvelope, CommandHandler, PipelineError};

use crate::app::errors;
use crate::app::services::GatewayServices;
use crate::context::Principal;

/// Decodes the envelope through the command registry and runs it through the
/// authorized pipeline. Malformed commands are rejected before authorization.
pub async fn execute(
    Extension(services): Extension<Arc<GatewayServices>>,
    Extension(principal): Extension<Principal>,
    Json(envelope): Json<CommandEnvelope>,
) -> axum::response::Response {
    let command = match services.registry.decode(envelope) {
        Ok(command) => command,
        Err(err) => return errors::pipeline_error_to_response(PipelineError::from(err)),
    };

    let mut ctx = principal.call_context(&services.component);
    match services.pipeline.handle_command(&mut ctx, &command).await {
        Ok(reply) => Json(reply).into_response(),
        Err(err) => errors::pipeline_error_to_response(err),
    }
}
