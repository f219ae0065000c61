use stratus_auth::Policy;
use stratus_core::AggregateId;

/// Intent to change exactly one aggregate.
///
/// Commands are transient: the pipeline authorizes them, the aggregate turns
/// them into events, and only the events are stored.
///
/// Every command declares who may execute it through [`Command::policies`].
/// The list is evaluated existentially, so an empty list denies everyone.
/// Policies may depend on the payload (a tenant-scoped binding, the e-mail of
/// the user being created) and are therefore built per instance.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;

    /// Type tag of the target stream ("user", "tenant", "cluster").
    fn aggregate_type(&self) -> &'static str;

    /// Type tag of the command ("user.create", ...). Registry key on the wire.
    fn command_type(&self) -> &'static str;

    fn policies(&self) -> Vec<Policy>;
}
