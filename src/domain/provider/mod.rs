//! Provider protocol - commands into a connection service, events out of it

pub mod command;
pub mod event;
pub mod service;

pub use command::ProviderCommand;
pub use event::ProviderEvent;
pub use service::{ConnectionService, ProviderError};
