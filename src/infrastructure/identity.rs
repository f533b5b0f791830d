//! In-memory caller directory

use crate::domain::identity::{CallerIdentity, IdentityResolver};
use crate::domain::shared::value_objects::Address;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Resolves identities from a map keyed by address target
pub struct DirectoryResolver {
    entries: RwLock<HashMap<String, CallerIdentity>>,
    latency: Option<Duration>,
}

impl DirectoryResolver {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            latency: None,
        }
    }

    /// Delay every lookup, to stand in for a remote directory
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn insert(&self, number: impl Into<String>, identity: CallerIdentity) {
        self.entries.write().await.insert(number.into(), identity);
    }

    pub async fn remove(&self, number: &str) -> Option<CallerIdentity> {
        self.entries.write().await.remove(number)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for DirectoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityResolver for DirectoryResolver {
    async fn resolve(&self, address: &Address) -> Option<CallerIdentity> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let found = self.entries.read().await.get(address.target()).cloned();
        debug!(address = %address, found = found.is_some(), "Identity lookup");
        found
    }
}
