//! Disposable key/value storage for read models.

pub mod store;

pub use store::{InMemoryReadModelStore, ReadModelStore};
