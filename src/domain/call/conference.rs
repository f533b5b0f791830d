//! Conference aggregate
//!
//! Groups member calls of a single provider under one handle.

use crate::domain::call::value_object::{CallCapabilities, DisconnectCause};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{AccountHandle, ConferenceId, ProviderId, SessionId};
use crate::domain::shared::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conference state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConferenceState {
    Active,
    Holding,
    Disconnected,
}

impl ConferenceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConferenceState::Disconnected)
    }
}

#[derive(Debug, Clone)]
pub struct Conference {
    id: ConferenceId,
    provider_id: ProviderId,
    account: AccountHandle,
    state: ConferenceState,
    capabilities: CallCapabilities,
    /// Join order is kept
    members: Vec<SessionId>,
    disconnect_cause: Option<DisconnectCause>,
    created_at: DateTime<Utc>,
}

impl Conference {
    pub fn new(
        id: ConferenceId,
        account: AccountHandle,
        members: Vec<SessionId>,
        state: ConferenceState,
        capabilities: CallCapabilities,
    ) -> Result<Self> {
        let mut unique = Vec::with_capacity(members.len());
        for member in members {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }
        if unique.is_empty() {
            return Err(DomainError::ValidationError(format!(
                "conference {} needs at least one member",
                id
            )));
        }
        if state.is_terminal() {
            return Err(DomainError::InvalidStateTransition(format!(
                "conference {} cannot start disconnected",
                id
            )));
        }

        Ok(Self {
            id,
            provider_id: account.provider_id.clone(),
            account,
            state,
            capabilities,
            members: unique,
            disconnect_cause: None,
            created_at: Utc::now(),
        })
    }

    /// Add a member; no-op if already present
    pub fn add_member(&mut self, session_id: SessionId) -> Result<bool> {
        self.ensure_live()?;
        if self.members.contains(&session_id) {
            return Ok(false);
        }
        self.members.push(session_id);
        Ok(true)
    }

    /// Remove a member. Returns true if it was present.
    pub fn remove_member(&mut self, session_id: &SessionId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != session_id);
        before != self.members.len()
    }

    pub fn set_state(&mut self, state: ConferenceState) -> Result<()> {
        self.ensure_live()?;
        self.state = state;
        Ok(())
    }

    pub fn set_disconnected(&mut self, cause: DisconnectCause) -> Result<()> {
        self.ensure_live()?;
        self.state = ConferenceState::Disconnected;
        self.disconnect_cause = Some(cause);
        Ok(())
    }

    pub fn set_capabilities(&mut self, capabilities: CallCapabilities) -> Result<()> {
        self.ensure_live()?;
        self.capabilities = capabilities;
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(DomainError::InvalidStateTransition(format!(
                "conference {} is disconnected",
                self.id
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> &ConferenceId {
        &self.id
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    pub fn state(&self) -> ConferenceState {
        self.state
    }

    pub fn members(&self) -> &[SessionId] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn snapshot(&self) -> ConferenceSnapshot {
        ConferenceSnapshot {
            id: self.id,
            provider_id: self.provider_id.clone(),
            account: self.account.clone(),
            state: self.state,
            capabilities: self.capabilities,
            members: self.members.clone(),
            disconnect_cause: self.disconnect_cause.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceSnapshot {
    pub id: ConferenceId,
    pub provider_id: ProviderId,
    pub account: AccountHandle,
    pub state: ConferenceState,
    pub capabilities: CallCapabilities,
    pub members: Vec<SessionId>,
    pub disconnect_cause: Option<DisconnectCause>,
    pub created_at: DateTime<Utc>,
}
