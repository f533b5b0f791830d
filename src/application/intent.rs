//! Intent processor - turns "place a call" requests into sessions

use crate::application::broker::SessionBroker;
use crate::domain::account::{Account, AccountRegistry};
use crate::domain::call::CallDirection;
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{AccountHandle, Address, ProviderId, SessionId};
use crate::domain::shared::Result;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct IntentProcessor {
    accounts: Arc<AccountRegistry>,
    broker: SessionBroker,
    default_scheme: String,
}

impl IntentProcessor {
    pub fn new(
        accounts: Arc<AccountRegistry>,
        broker: SessionBroker,
        default_scheme: impl Into<String>,
    ) -> Self {
        Self {
            accounts,
            broker,
            default_scheme: default_scheme.into(),
        }
    }

    /// Place an outgoing call. Account selection failures are reported
    /// before any provider is contacted.
    pub async fn place_call(
        &self,
        address: &str,
        account: Option<&AccountHandle>,
    ) -> Result<SessionId> {
        let address = Address::parse_with_default(address, &self.default_scheme)?;
        let account = self.select_account(&address, account)?;
        info!("Placing call to {} on {}", address, account.handle());
        self.broker
            .create_session(account.handle().clone(), address, CallDirection::Outgoing)
            .await
    }

    /// Surface a call arriving on `account`; its provider will report ringing
    pub async fn process_incoming_call(
        &self,
        account: &AccountHandle,
        address: &str,
    ) -> Result<SessionId> {
        if !self.accounts.contains(account) {
            return Err(DomainError::UnknownAccount(account.clone()));
        }
        let address = Address::parse_with_default(address, &self.default_scheme)?;
        info!("Incoming call from {} on {}", address, account);
        self.broker
            .create_session(account.clone(), address, CallDirection::Incoming)
            .await
    }

    /// Explicit account, else the default outgoing account, else the only
    /// call-capable account supporting the scheme.
    pub fn select_account(
        &self,
        address: &Address,
        explicit: Option<&AccountHandle>,
    ) -> Result<Account> {
        let scheme = address.scheme();
        let usable = |account: &Account| account.can_place_calls() && account.supports_scheme(scheme);

        if let Some(handle) = explicit {
            let account = self
                .accounts
                .get(handle)
                .ok_or_else(|| DomainError::UnknownAccount(handle.clone()))?;
            if !usable(&account) {
                return Err(DomainError::NoMatchingAccount(scheme.to_string()));
            }
            return Ok(account);
        }

        if let Some(default) = self.accounts.default_outgoing() {
            if usable(&default) {
                return Ok(default);
            }
            debug!(
                "Default account {} does not support '{}'",
                default.handle(),
                scheme
            );
        }

        let mut candidates: Vec<Account> = self
            .accounts
            .list(Some(scheme))
            .into_iter()
            .filter(|account| account.can_place_calls())
            .collect();
        match candidates.len() {
            1 => Ok(candidates.remove(0)),
            _ => Err(DomainError::NoMatchingAccount(scheme.to_string())),
        }
    }

    /// Unbind a provider and drop its accounts. Returns how many accounts
    /// were removed.
    pub async fn unbind_provider(&self, provider_id: &ProviderId) -> Result<usize> {
        self.broker.unbind_provider(provider_id).await?;
        let removed = self.accounts.unregister_provider(provider_id);
        info!("Unbound provider {} ({} accounts removed)", provider_id, removed);
        Ok(removed)
    }

    pub fn accounts(&self) -> &Arc<AccountRegistry> {
        &self.accounts
    }
}
