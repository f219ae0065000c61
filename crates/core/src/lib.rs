//! `stratus-core`: domain primitives shared by every control-plane crate.
//!
//! Pure types only: identifiers, the aggregate contract, domain errors and
//! field validation. No IO.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod validation;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, ClusterId, RoleBindingId, TenantId, UserId};
