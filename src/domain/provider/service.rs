//! Connection service port - the provider side of the protocol

use super::command::ProviderCommand;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider connection is gone; the broker force-disconnects its calls
    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    /// The provider refused this one command
    #[error("Command rejected: {0}")]
    Rejected(String),
}

/// A call provider (connection service) as seen by its adapter.
///
/// Commands are delivered one at a time in the order the broker issued
/// them. Results of a command are reported later through the provider's
/// `ProviderConnection`, never through the return value.
#[async_trait]
pub trait ConnectionService: Send + Sync {
    async fn on_command(&self, command: ProviderCommand) -> Result<(), ProviderError>;
}
