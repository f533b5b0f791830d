//! Shared value objects used across multiple bounded contexts

use super::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Session (call) identifier
    SessionId
);

uuid_id!(
    /// Conference identifier
    ConferenceId
);

uuid_id!(
    /// Attached controller identifier
    ControllerId
);

/// Call provider identifier (one per connection service)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account handle: the (provider, account) pair that names a phone account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountHandle {
    pub provider_id: ProviderId,
    pub account_id: String,
}

impl AccountHandle {
    pub fn new(provider_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            provider_id: ProviderId::new(provider_id),
            account_id: account_id.into(),
        }
    }
}

impl fmt::Display for AccountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.account_id)
    }
}

/// Addressing scheme for telephone numbers
pub const SCHEME_TEL: &str = "tel";
/// Addressing scheme for SIP URIs
pub const SCHEME_SIP: &str = "sip";
/// Addressing scheme for voicemail
pub const SCHEME_VOICEMAIL: &str = "voicemail";

/// Target address of a call, e.g. `tel:650-555-1212` or `sip:alice@example.com`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    scheme: String,
    target: String,
}

impl Address {
    pub fn new(scheme: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            target: target.into(),
        }
    }

    /// Parse an address, assuming `tel` when no scheme is present.
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        Self::parse_with_default(input, SCHEME_TEL)
    }

    /// Parse an address; a bare dial string gets `default_scheme`.
    pub fn parse_with_default(input: &str, default_scheme: &str) -> Result<Self, DomainError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DomainError::InvalidAddress("empty address".to_string()));
        }

        match input.split_once(':') {
            Some((scheme, target)) if is_scheme(scheme) => {
                if target.is_empty() {
                    return Err(DomainError::InvalidAddress(format!(
                        "missing target in '{}'",
                        input
                    )));
                }
                Ok(Self::new(scheme, target))
            }
            _ => Ok(Self::new(default_scheme, input)),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.target)
    }
}
