use async_trait::async_trait;
use tracing::{debug, info, warn};

use stratus_auth::{Decision, authorize};
use stratus_events::Command;

use crate::context::CallContext;
use crate::pipeline::{CommandReply, Middleware, Next, PipelineError};

/// Evaluates the command's policies against the principal resolved earlier in
/// the chain.
///
/// Role bindings that were never resolved count as none, so only subject
/// policies can grant access then.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthorizationHandler;

impl AuthorizationHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<C: Command> Middleware<C> for AuthorizationHandler {
    async fn handle(
        &self,
        ctx: &mut CallContext,
        cmd: &C,
        next: Next<C>,
    ) -> Result<CommandReply, PipelineError> {
        ctx.ensure_active()?;
        let email = ctx.metadata().user_information().email;

        if ctx.metadata().authorization_bypass() {
            warn!(
                command_type = cmd.command_type(),
                aggregate_id = %cmd.target_aggregate_id(),
                email = %email,
                "authorization bypass set; skipping policy evaluation"
            );
            return next.run(ctx, cmd).await;
        }

        let policies = cmd.policies();
        match authorize(&policies, &email, ctx.metadata().role_bindings()) {
            Decision::Granted {
                policy_index,
                grant,
            } => {
                debug!(
                    command_type = cmd.command_type(),
                    aggregate_id = %cmd.target_aggregate_id(),
                    policy_index,
                    ?grant,
                    "command authorized"
                );
                next.run(ctx, cmd).await
            }
            Decision::Denied => {
                info!(
                    command_type = cmd.command_type(),
                    aggregate_id = %cmd.target_aggregate_id(),
                    email = %email,
                    "command denied"
                );
                Err(PipelineError::Unauthorized)
            }
        }
    }
}
