//! Domain errors

use super::value_objects::{AccountHandle, ConferenceId, ControllerId, ProviderId, SessionId};
use thiserror::Error;

/// Domain result type
pub type Result<T> = std::result::Result<T, DomainError>;

/// Every error a provider or controller can observe from the broker.
///
/// None of these tear down the broker; they are returned on the command
/// that triggered them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("No such active session: {0}")]
    NoSuchSession(SessionId),

    #[error("Session no longer active: {0}")]
    SessionNotActive(SessionId),

    #[error("No such conference: {0}")]
    NoSuchConference(ConferenceId),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Session {rejected} cannot ring while {ringing} is ringing")]
    RingingConflict {
        ringing: SessionId,
        rejected: SessionId,
    },

    #[error("Unknown account: {0}")]
    UnknownAccount(AccountHandle),

    #[error("No account available for scheme '{0}'")]
    NoMatchingAccount(String),

    #[error("Provider not bound: {0}")]
    ProviderNotBound(ProviderId),

    #[error("Provider lost: {0}")]
    ProviderLost(ProviderId),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Controller detached: {0}")]
    ControllerDetached(ControllerId),

    #[error("Broker unavailable")]
    BrokerUnavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Short machine-readable code, used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NoSuchSession(_) => "no_such_session",
            DomainError::SessionNotActive(_) => "session_not_active",
            DomainError::NoSuchConference(_) => "no_such_conference",
            DomainError::InvalidStateTransition(_) => "invalid_state_transition",
            DomainError::RingingConflict { .. } => "ringing_conflict",
            DomainError::UnknownAccount(_) => "unknown_account",
            DomainError::NoMatchingAccount(_) => "no_matching_account",
            DomainError::ProviderNotBound(_) => "provider_not_bound",
            DomainError::ProviderLost(_) => "provider_lost",
            DomainError::InvalidAddress(_) => "invalid_address",
            DomainError::ValidationError(_) => "validation_error",
            DomainError::ControllerDetached(_) => "controller_detached",
            DomainError::BrokerUnavailable => "broker_unavailable",
            DomainError::Internal(_) => "internal",
        }
    }
}
