//! Caller identity resolution port

use crate::domain::call::Presentation;
use crate::domain::shared::value_objects::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Resolved display identity of a remote party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub display_name: Option<String>,
    pub presentation: Presentation,
}

impl CallerIdentity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            display_name: Some(name.into()),
            presentation: Presentation::Allowed,
        }
    }
}

/// Looks up who is behind an address.
///
/// Completion may happen on any worker, or never; the broker does not
/// wait on it before surfacing the call.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `None` when the address is not known
    async fn resolve(&self, address: &Address) -> Option<CallerIdentity>;
}
