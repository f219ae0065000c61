//! Command handling pipeline.
//!
//! A pipeline is an ordered list of [`Middleware`] stages followed by an
//! optional terminal [`CommandHandler`]. Each stage receives a [`Next`] value
//! that runs the remainder of the chain; a stage that returns without calling
//! it short-circuits the call. Without a terminal handler the chain ends in an
//! empty [`CommandReply`].
//!
//! ```text
//! CallContext + Command
//!   ↓
//! UserInformationHandler   (principal → user id + role bindings)
//!   ↓
//! AuthorizationHandler     (command policies vs. role bindings)
//!   ↓
//! AggregateCommandHandler  (event store dispatch + projections)
//! ```

mod aggregate;
mod authorization;
mod error;
mod identity;

pub use aggregate::AggregateCommandHandler;
pub use authorization::AuthorizationHandler;
pub use error::PipelineError;
pub use identity::UserInformationHandler;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use stratus_core::AggregateId;
use stratus_events::Command;

use crate::context::CallContext;
use crate::event_store::StoredEvent;
use crate::repository::ReadOnlyUserRepository;

/// Outcome of a successfully handled command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub aggregate_id: Option<AggregateId>,
    /// Stream version after the write; `None` when nothing was committed.
    pub version: Option<u64>,
    pub events: Vec<String>,
}

impl CommandReply {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_committed(aggregate_id: AggregateId, committed: &[StoredEvent]) -> Self {
        Self {
            aggregate_id: Some(aggregate_id),
            version: committed.last().map(StoredEvent::stream_version),
            events: committed.iter().map(|e| e.event_type.clone()).collect(),
        }
    }
}

#[async_trait]
pub trait CommandHandler<C>: Send + Sync {
    async fn handle_command(
        &self,
        ctx: &mut CallContext,
        cmd: &C,
    ) -> Result<CommandReply, PipelineError>;
}

#[async_trait]
pub trait Middleware<C>: Send + Sync {
    async fn handle(
        &self,
        ctx: &mut CallContext,
        cmd: &C,
        next: Next<C>,
    ) -> Result<CommandReply, PipelineError>;
}

/// The rest of the chain after the current stage.
pub struct Next<C> {
    stages: Arc<[Arc<dyn Middleware<C>>]>,
    position: usize,
    terminal: Option<Arc<dyn CommandHandler<C>>>,
}

impl<C: Command> Next<C> {
    pub async fn run(self, ctx: &mut CallContext, cmd: &C) -> Result<CommandReply, PipelineError> {
        match self.stages.get(self.position).cloned() {
            Some(stage) => {
                let rest = Next {
                    stages: Arc::clone(&self.stages),
                    position: self.position + 1,
                    terminal: self.terminal.clone(),
                };
                stage.handle(ctx, cmd, rest).await
            }
            None => match &self.terminal {
                Some(terminal) => terminal.handle_command(ctx, cmd).await,
                None => Ok(CommandReply::empty()),
            },
        }
    }
}

/// Immutable, shareable chain built by [`PipelineBuilder`].
pub struct Pipeline<C> {
    stages: Arc<[Arc<dyn Middleware<C>>]>,
    terminal: Option<Arc<dyn CommandHandler<C>>>,
}

impl<C> Clone for Pipeline<C> {
    fn clone(&self) -> Self {
        Self {
            stages: Arc::clone(&self.stages),
            terminal: self.terminal.clone(),
        }
    }
}

#[async_trait]
impl<C: Command> CommandHandler<C> for Pipeline<C> {
    async fn handle_command(
        &self,
        ctx: &mut CallContext,
        cmd: &C,
    ) -> Result<CommandReply, PipelineError> {
        let next = Next {
            stages: Arc::clone(&self.stages),
            position: 0,
            terminal: self.terminal.clone(),
        };
        next.run(ctx, cmd).await
    }
}

pub struct PipelineBuilder<C> {
    stages: Vec<Arc<dyn Middleware<C>>>,
    terminal: Option<Arc<dyn CommandHandler<C>>>,
}

impl<C: Command> Default for PipelineBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Command> PipelineBuilder<C> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            terminal: None,
        }
    }

    /// Identity resolution followed by authorization, in that order.
    pub fn authorized<R>(users: R) -> Self
    where
        R: ReadOnlyUserRepository + 'static,
    {
        Self::new()
            .stage(UserInformationHandler::new(users))
            .stage(AuthorizationHandler::new())
    }

    pub fn stage(mut self, stage: impl Middleware<C> + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn terminal(mut self, handler: impl CommandHandler<C> + 'static) -> Self {
        self.terminal = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Pipeline<C> {
        Pipeline {
            stages: self.stages.into(),
            terminal: self.terminal,
        }
    }
}
