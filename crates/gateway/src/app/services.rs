use std::sync::Arc;

use stratus_core::UserId;
use stratus_infra::{
    AggregateCommandHandler, CommandRegistry, ComponentInformation, ControlPlaneCommand,
    InMemoryEventStore, InMemoryReadModelStore, Pipeline, PipelineBuilder, UserReadModel,
    UsersProjection,
};

use crate::auth::AuthService;

pub type UserStore = Arc<InMemoryReadModelStore<UserId, UserReadModel>>;
pub type Users = Arc<UsersProjection<UserStore>>;

/// Everything the routes need, shared behind an `Arc`.
pub struct GatewayServices {
    pub auth: Arc<AuthService>,
    pub registry: CommandRegistry,
    pub pipeline: Pipeline<ControlPlaneCommand>,
    pub users: Users,
    pub store: Arc<InMemoryEventStore>,
    pub component: ComponentInformation,
}

/// In-memory infra wiring: event store, users projection and the authorized
/// command pipeline on top of them.
pub fn build_services(auth: Arc<AuthService>, component: ComponentInformation) -> GatewayServices {
    let store = Arc::new(InMemoryEventStore::new());
    let users: Users = Arc::new(UsersProjection::new(Arc::new(InMemoryReadModelStore::new())));

    let terminal = AggregateCommandHandler::new(Arc::clone(&store)).with_projection(users.clone());
    let pipeline = PipelineBuilder::<ControlPlaneCommand>::authorized(users.clone())
        .terminal(terminal)
        .build();

    GatewayServices {
        auth,
        registry: CommandRegistry::with_defaults(),
        pipeline,
        users,
        store,
        component,
    }
}
