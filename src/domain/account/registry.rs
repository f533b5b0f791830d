//! Account registry
//!
//! Read-mostly store of registered accounts. Owned by whoever builds the
//! broker and shared by handle; there is no process-wide instance.

use super::entity::Account;
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{AccountHandle, ProviderId};
use crate::domain::shared::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountHandle, Account>,
    default_outgoing: Option<AccountHandle>,
}

/// Registered call accounts plus the default outgoing selection
#[derive(Default)]
pub struct AccountRegistry {
    inner: RwLock<Inner>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account, replacing any descriptor with the same handle.
    ///
    /// Returns the replaced descriptor, if any.
    pub fn register(&self, account: Account) -> Option<Account> {
        let handle = account.handle().clone();
        let previous = self.inner.write().accounts.insert(handle.clone(), account);
        if previous.is_some() {
            info!("Account {} re-registered", handle);
        } else {
            info!("Account {} registered", handle);
        }
        previous
    }

    /// Remove an account. Clears the default outgoing selection if it
    /// pointed at this account.
    pub fn unregister(&self, handle: &AccountHandle) -> Result<Account> {
        let mut inner = self.inner.write();
        let removed = inner
            .accounts
            .remove(handle)
            .ok_or_else(|| DomainError::UnknownAccount(handle.clone()))?;
        if inner.default_outgoing.as_ref() == Some(handle) {
            inner.default_outgoing = None;
            debug!("Default outgoing account {} cleared", handle);
        }
        info!("Account {} unregistered", handle);
        Ok(removed)
    }

    /// Remove every account owned by a provider
    pub fn unregister_provider(&self, provider_id: &ProviderId) -> usize {
        let mut inner = self.inner.write();
        let before = inner.accounts.len();
        inner.accounts.retain(|handle, _| &handle.provider_id != provider_id);
        if matches!(&inner.default_outgoing, Some(h) if &h.provider_id == provider_id) {
            inner.default_outgoing = None;
        }
        before - inner.accounts.len()
    }

    pub fn set_default_outgoing(&self, handle: &AccountHandle) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.accounts.contains_key(handle) {
            return Err(DomainError::UnknownAccount(handle.clone()));
        }
        inner.default_outgoing = Some(handle.clone());
        info!("Default outgoing account set to {}", handle);
        Ok(())
    }

    pub fn clear_default_outgoing(&self) {
        self.inner.write().default_outgoing = None;
    }

    pub fn default_outgoing(&self) -> Option<Account> {
        let inner = self.inner.read();
        inner
            .default_outgoing
            .as_ref()
            .and_then(|handle| inner.accounts.get(handle))
            .cloned()
    }

    pub fn get(&self, handle: &AccountHandle) -> Option<Account> {
        self.inner.read().accounts.get(handle).cloned()
    }

    pub fn contains(&self, handle: &AccountHandle) -> bool {
        self.inner.read().accounts.contains_key(handle)
    }

    /// List accounts, optionally only those supporting `scheme`.
    /// Ordered by handle.
    pub fn list(&self, scheme: Option<&str>) -> Vec<Account> {
        let inner = self.inner.read();
        let mut accounts: Vec<Account> = inner
            .accounts
            .values()
            .filter(|a| scheme.map_or(true, |s| a.supports_scheme(s)))
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.handle().cmp(b.handle()));
        accounts
    }

    pub fn count(&self) -> usize {
        self.inner.read().accounts.len()
    }
}
