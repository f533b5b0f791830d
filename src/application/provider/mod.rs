//! Provider side of the broker - subscription bus and command forwarding

pub mod adapter;
pub mod connection;

pub use adapter::ProviderAdapter;
pub use connection::{ProviderConnection, ProviderObserver, SubscriptionId};
