//! Application layer - the broker and the services around it
//!
//! This layer orchestrates domain objects to fulfill use cases:
//! - The session broker worker and its state machine
//! - Controller attachment and fan-out
//! - Provider subscription and command forwarding
//! - Call intents and account selection

pub mod broker;
pub mod controller;
pub mod intent;
pub mod provider;

pub use broker::{BrokerSettings, SessionBroker};
pub use controller::{ControllerCommand, ControllerEvent, ControllerHandle};
pub use intent::IntentProcessor;
pub use provider::{ProviderConnection, ProviderObserver};
