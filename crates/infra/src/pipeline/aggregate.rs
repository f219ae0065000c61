use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{error, info};

use stratus_clusters::Cluster;
use stratus_core::ClusterId;
use stratus_events::Command;
use stratus_tenants::Tenant;
use stratus_users::User;

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::commands::ControlPlaneCommand;
use crate::context::CallContext;
use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::pipeline::{CommandHandler, CommandReply, PipelineError};
use crate::projections::Projection;

/// Terminal stage: executes the command against its aggregate and feeds the
/// committed events to the registered projections.
///
/// Writes are serialized so projections observe events in commit order.
pub struct AggregateCommandHandler<S> {
    dispatcher: CommandDispatcher<S>,
    projections: Vec<Arc<dyn Projection>>,
    write_lock: Mutex<()>,
}

impl<S: EventStore> AggregateCommandHandler<S> {
    pub fn new(store: S) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store),
            projections: Vec::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_projection(mut self, projection: Arc<dyn Projection>) -> Self {
        self.projections.push(projection);
        self
    }

    fn execute(&self, cmd: &ControlPlaneCommand) -> Result<Vec<StoredEvent>, DispatchError> {
        let aggregate_id = cmd.target_aggregate_id();
        match cmd {
            ControlPlaneCommand::User(c) => self.dispatcher.dispatch(
                aggregate_id,
                stratus_users::AGGREGATE_TYPE,
                c,
                |id| User::empty(id.into()),
            ),
            ControlPlaneCommand::Tenant(c) => self.dispatcher.dispatch(
                aggregate_id,
                stratus_tenants::AGGREGATE_TYPE,
                c,
                |id| Tenant::empty(id.into()),
            ),
            ControlPlaneCommand::Cluster(c) => self.dispatcher.dispatch(
                aggregate_id,
                stratus_clusters::AGGREGATE_TYPE,
                c,
                |id| Cluster::empty(ClusterId::from(id)),
            ),
        }
    }

    fn project(&self, committed: &[StoredEvent]) {
        for event in committed {
            for projection in &self.projections {
                if let Err(err) = projection.apply(event) {
                    error!(
                        projection = projection.name(),
                        event_id = %event.event_id,
                        error = %err,
                        "projection failed to apply committed event"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl<S: EventStore> CommandHandler<ControlPlaneCommand> for AggregateCommandHandler<S> {
    async fn handle_command(
        &self,
        ctx: &mut CallContext,
        cmd: &ControlPlaneCommand,
    ) -> Result<CommandReply, PipelineError> {
        ctx.ensure_active()?;

        let committed = {
            let _guard = self.write_lock.lock().map_err(|_| {
                DispatchError::Store(EventStoreError::Unavailable("write lock poisoned".to_string()))
            })?;
            let committed = self.execute(cmd)?;
            self.project(&committed);
            committed
        };

        info!(
            command_type = cmd.command_type(),
            aggregate_id = %cmd.target_aggregate_id(),
            events = committed.len(),
            "command executed"
        );
        Ok(CommandReply::from_committed(cmd.target_aggregate_id(), &committed))
    }
}
