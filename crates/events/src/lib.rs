//! Event and command contracts shared by the domain crates and the pipeline.

pub mod command;
pub mod event;

pub use command::Command;
pub use event::Event;
