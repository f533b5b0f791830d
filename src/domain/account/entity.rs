//! Phone account descriptor

use crate::domain::shared::value_objects::{AccountHandle, ProviderId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Capability bitmask of an account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountCapabilities(u32);

impl AccountCapabilities {
    pub const NONE: Self = Self(0);
    /// The account can place and receive calls
    pub const CALL_PROVIDER: Self = Self(1 << 0);
    /// The account manages connections for other accounts
    pub const CONNECTION_MANAGER: Self = Self(1 << 1);
    /// The account is backed by a SIM line
    pub const SIM_SUBSCRIPTION: Self = Self(1 << 2);
    pub const VIDEO_CALLING: Self = Self(1 << 3);
    pub const PLACE_EMERGENCY_CALLS: Self = Self(1 << 4);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for AccountCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// A registered call account
///
/// Immutable once registered; re-registering the same handle replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    handle: AccountHandle,
    label: String,
    supported_schemes: BTreeSet<String>,
    capabilities: AccountCapabilities,
}

impl Account {
    pub fn new(handle: AccountHandle, label: impl Into<String>) -> Self {
        Self {
            handle,
            label: label.into(),
            supported_schemes: BTreeSet::new(),
            capabilities: AccountCapabilities::CALL_PROVIDER,
        }
    }

    pub fn with_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.supported_schemes = schemes
            .into_iter()
            .map(|s| s.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn with_capabilities(mut self, capabilities: AccountCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn handle(&self) -> &AccountHandle {
        &self.handle
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.handle.provider_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn supported_schemes(&self) -> &BTreeSet<String> {
        &self.supported_schemes
    }

    pub fn capabilities(&self) -> AccountCapabilities {
        self.capabilities
    }

    pub fn supports_scheme(&self, scheme: &str) -> bool {
        self.supported_schemes.contains(&scheme.to_ascii_lowercase())
    }

    pub fn can_place_calls(&self) -> bool {
        self.capabilities.contains(AccountCapabilities::CALL_PROVIDER)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.handle)
    }
}
