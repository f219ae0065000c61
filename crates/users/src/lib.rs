//! Users domain module (event-sourced).
//!
//! Users are keyed by e-mail for authentication and hold the role bindings
//! that command policies are evaluated against. Pure domain logic, no IO.

pub mod user;

pub use user::{
    AGGREGATE_TYPE, CreateUser, CreateUserRoleBinding, DeleteUser, DeleteUserRoleBinding,
    RoleBindingCreated, RoleBindingDeleted, UpdateUser, User, UserCommand, UserCreated,
    UserDeleted, UserEvent, UserStatus, UserUpdated,
};
