//! Tenants domain module (event-sourced).

pub mod tenant;

pub use tenant::{
    AGGREGATE_TYPE, CreateTenant, DeleteTenant, Tenant, TenantCommand, TenantCreated,
    TenantDeleted, TenantEvent, TenantStatus, TenantUpdated, UpdateTenant,
};
