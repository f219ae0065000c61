//! Infrastructure layer: event store, read models and the authorized command
//! pipeline.

pub mod command_dispatcher;
pub mod commands;
pub mod context;
pub mod event_store;
pub mod metadata;
pub mod pipeline;
pub mod projections;
pub mod read_model;
pub mod repository;

mod integration_tests;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use commands::{CommandEnvelope, CommandRegistry, ControlPlaneCommand, DecodeError, DecodeFn};
pub use context::{CallContext, CancelHandle};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};
pub use metadata::{ComponentInformation, DomainMetadataManager, UserInformation};
pub use pipeline::{
    AggregateCommandHandler, AuthorizationHandler, CommandHandler, CommandReply, Middleware, Next,
    Pipeline, PipelineBuilder, PipelineError, UserInformationHandler,
};
pub use projections::{Projection, UserReadModel, UsersProjection};
pub use read_model::{InMemoryReadModelStore, ReadModelStore};
pub use repository::{ReadOnlyUserRepository, RepositoryError};
