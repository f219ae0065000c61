//! Clusters domain module (event-sourced). Every cluster belongs to a tenant.

pub mod cluster;

pub use cluster::{
    AGGREGATE_TYPE, Cluster, ClusterCommand, ClusterCreated, ClusterDeleted, ClusterEvent,
    ClusterStatus, ClusterUpdated, CreateCluster, DeleteCluster, UpdateCluster,
};
