//! Call aggregate root

use crate::domain::call::event::CallEvent;
use crate::domain::call::value_object::{
    CallCapabilities, CallDirection, CallState, DisconnectCause, Presentation, VideoState,
};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{
    AccountHandle, Address, ConferenceId, ProviderId, SessionId,
};
use crate::domain::shared::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Call aggregate root
///
/// One session tracked by the broker. The owning provider never changes.
/// Every mutator records a [`CallEvent`]; the broker drains them with
/// [`Call::take_events`] and turns them into controller deltas.
#[derive(Debug, Clone)]
pub struct Call {
    id: SessionId,
    provider_id: ProviderId,
    account: AccountHandle,
    address: Address,
    address_presentation: Presentation,
    direction: CallDirection,
    state: CallState,
    capabilities: CallCapabilities,
    conference_id: Option<ConferenceId>,
    conferenceable: Vec<SessionId>,
    disconnect_cause: Option<DisconnectCause>,
    video_state: VideoState,
    video_provider: Option<String>,
    caller_display_name: Option<String>,
    caller_display_name_presentation: Presentation,
    post_dial_wait: Option<String>,
    extras: BTreeMap<String, String>,
    /// Provider has reported at least one event for this call
    acknowledged: bool,
    /// Hold sent so that this session can become active
    yielding_to: Option<SessionId>,
    created_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    disconnected_at: Option<DateTime<Utc>>,
    events: Vec<CallEvent>,
}

impl Call {
    /// Create a new call in `NEW`
    pub fn new(
        id: SessionId,
        account: AccountHandle,
        address: Address,
        direction: CallDirection,
    ) -> Self {
        Self {
            id,
            provider_id: account.provider_id.clone(),
            account,
            address,
            address_presentation: Presentation::Allowed,
            direction,
            state: CallState::New,
            capabilities: CallCapabilities::NONE,
            conference_id: None,
            conferenceable: Vec::new(),
            disconnect_cause: None,
            video_state: VideoState::AudioOnly,
            video_provider: None,
            caller_display_name: None,
            caller_display_name_presentation: Presentation::Allowed,
            post_dial_wait: None,
            extras: BTreeMap::new(),
            acknowledged: false,
            yielding_to: None,
            created_at: Utc::now(),
            connected_at: None,
            disconnected_at: None,
            events: Vec::new(),
        }
    }

    /// A call the provider already owns, surfacing in `state`.
    ///
    /// `state` must be live; `Ringing` is subject to the broker's
    /// single-ringing check before insertion.
    pub fn existing(
        id: SessionId,
        account: AccountHandle,
        address: Address,
        direction: CallDirection,
        state: CallState,
    ) -> Result<Self> {
        if state.is_terminal() {
            return Err(DomainError::InvalidStateTransition(format!(
                "existing call {} cannot start {}",
                id, state
            )));
        }
        let mut call = Self::new(id, account, address, direction);
        call.state = state;
        call.acknowledged = true;
        if matches!(state, CallState::Active | CallState::Holding) {
            call.connected_at = Some(call.created_at);
        }
        Ok(call)
    }

    pub fn set_dialing(&mut self) -> Result<()> {
        self.transition_to(CallState::Dialing, None)
    }

    pub fn set_ringing(&mut self) -> Result<()> {
        self.transition_to(CallState::Ringing, None)
    }

    pub fn set_active(&mut self) -> Result<()> {
        self.transition_to(CallState::Active, None)?;
        self.yielding_to = None;
        if self.connected_at.is_none() {
            self.connected_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn set_on_hold(&mut self) -> Result<()> {
        self.transition_to(CallState::Holding, None)?;
        self.yielding_to = None;
        Ok(())
    }

    pub fn set_disconnected(&mut self, cause: DisconnectCause) -> Result<()> {
        self.transition_to(CallState::Disconnected, Some(cause.clone()))?;
        self.disconnect_cause = Some(cause);
        self.disconnected_at = Some(Utc::now());
        self.yielding_to = None;
        self.post_dial_wait = None;
        Ok(())
    }

    /// Mark that the provider answered the create request
    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
    }

    /// Record that a hold was sent to make room for `other`
    pub fn yield_to(&mut self, other: SessionId) {
        self.yielding_to = Some(other);
    }

    /// The provider refused the hold; the next activation asks again
    pub fn clear_yield(&mut self) -> Option<SessionId> {
        self.yielding_to.take()
    }

    pub fn set_capabilities(&mut self, capabilities: CallCapabilities) -> Result<()> {
        self.ensure_live()?;
        if self.capabilities != capabilities {
            self.capabilities = capabilities;
            self.record_event(CallEvent::capabilities_changed(self.id, capabilities));
        }
        Ok(())
    }

    pub fn set_conference(&mut self, conference_id: Option<ConferenceId>) -> Result<()> {
        self.ensure_live()?;
        if self.conference_id != conference_id {
            self.conference_id = conference_id;
            self.record_event(CallEvent::conference_changed(self.id, conference_id));
        }
        Ok(())
    }

    /// Drop the conference link without recording an event; used while the
    /// call is being torn down.
    pub(crate) fn clear_conference(&mut self) {
        self.conference_id = None;
    }

    pub fn set_conferenceable(&mut self, peers: Vec<SessionId>) -> Result<()> {
        self.ensure_live()?;
        let peers: Vec<SessionId> = peers.into_iter().filter(|p| *p != self.id).collect();
        if self.conferenceable != peers {
            self.conferenceable = peers;
            self.record_event(CallEvent::details_changed(self.id, "conferenceable"));
        }
        Ok(())
    }

    pub fn remove_conferenceable(&mut self, peer: &SessionId) {
        let before = self.conferenceable.len();
        self.conferenceable.retain(|p| p != peer);
        if before != self.conferenceable.len() && !self.state.is_terminal() {
            self.record_event(CallEvent::details_changed(self.id, "conferenceable"));
        }
    }

    pub fn set_address(&mut self, address: Address, presentation: Presentation) -> Result<()> {
        self.ensure_live()?;
        self.address = address;
        self.address_presentation = presentation;
        self.record_event(CallEvent::details_changed(self.id, "address"));
        Ok(())
    }

    pub fn set_caller_display_name(
        &mut self,
        name: Option<String>,
        presentation: Presentation,
    ) -> Result<()> {
        self.ensure_live()?;
        self.caller_display_name = name;
        self.caller_display_name_presentation = presentation;
        self.record_event(CallEvent::details_changed(self.id, "caller_display_name"));
        Ok(())
    }

    pub fn set_video_state(&mut self, video_state: VideoState) -> Result<()> {
        self.ensure_live()?;
        if self.video_state != video_state {
            self.video_state = video_state;
            self.record_event(CallEvent::details_changed(self.id, "video_state"));
        }
        Ok(())
    }

    pub fn set_video_provider(&mut self, video_provider: Option<String>) -> Result<()> {
        self.ensure_live()?;
        if self.video_provider != video_provider {
            self.video_provider = video_provider;
            self.record_event(CallEvent::details_changed(self.id, "video_provider"));
        }
        Ok(())
    }

    pub fn set_post_dial_wait(&mut self, remaining: Option<String>) -> Result<()> {
        self.ensure_live()?;
        self.post_dial_wait = remaining;
        self.record_event(CallEvent::details_changed(self.id, "post_dial_wait"));
        Ok(())
    }

    pub fn set_extras(&mut self, extras: BTreeMap<String, String>) -> Result<()> {
        self.ensure_live()?;
        self.extras = extras;
        self.record_event(CallEvent::details_changed(self.id, "extras"));
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(DomainError::SessionNotActive(self.id));
        }
        Ok(())
    }

    /// Transition to a new state
    fn transition_to(&mut self, new_state: CallState, cause: Option<DisconnectCause>) -> Result<()> {
        if self.state.is_terminal() {
            return Err(DomainError::SessionNotActive(self.id));
        }
        if !self.state.can_transition_to(new_state) {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot transition call {} from {} to {}",
                self.id, self.state, new_state
            )));
        }

        let from = self.state;
        self.state = new_state;
        self.acknowledged = true;
        self.record_event(CallEvent::state_changed(self.id, from, new_state, cause));
        Ok(())
    }

    /// Record a domain event
    fn record_event(&mut self, event: CallEvent) {
        self.events.push(event);
    }

    /// Take all pending events
    pub fn take_events(&mut self) -> Vec<CallEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            id: self.id,
            provider_id: self.provider_id.clone(),
            account: self.account.clone(),
            address: self.address.clone(),
            address_presentation: self.address_presentation,
            direction: self.direction,
            state: self.state,
            capabilities: self.capabilities,
            conference_id: self.conference_id,
            conferenceable: self.conferenceable.clone(),
            disconnect_cause: self.disconnect_cause.clone(),
            video_state: self.video_state,
            video_provider: self.video_provider.clone(),
            caller_display_name: self.caller_display_name.clone(),
            caller_display_name_presentation: self.caller_display_name_presentation,
            post_dial_wait: self.post_dial_wait.clone(),
            extras: self.extras.clone(),
            created_at: self.created_at,
            connected_at: self.connected_at,
            disconnected_at: self.disconnected_at,
        }
    }

    // Getters
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    pub fn account(&self) -> &AccountHandle {
        &self.account
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn capabilities(&self) -> CallCapabilities {
        self.capabilities
    }

    pub fn conference_id(&self) -> Option<ConferenceId> {
        self.conference_id
    }

    pub fn conferenceable(&self) -> &[SessionId] {
        &self.conferenceable
    }

    pub fn disconnect_cause(&self) -> Option<&DisconnectCause> {
        self.disconnect_cause.as_ref()
    }

    pub fn post_dial_wait(&self) -> Option<&str> {
        self.post_dial_wait.as_deref()
    }

    pub fn caller_display_name(&self) -> Option<&str> {
        self.caller_display_name.as_deref()
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn is_yielding_to(&self, other: &SessionId) -> bool {
        self.yielding_to.as_ref() == Some(other)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }
}

/// Immutable view of a call handed to controllers and the HTTP surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSnapshot {
    pub id: SessionId,
    pub provider_id: ProviderId,
    pub account: AccountHandle,
    pub address: Address,
    pub address_presentation: Presentation,
    pub direction: CallDirection,
    pub state: CallState,
    pub capabilities: CallCapabilities,
    pub conference_id: Option<ConferenceId>,
    pub conferenceable: Vec<SessionId>,
    pub disconnect_cause: Option<DisconnectCause>,
    pub video_state: VideoState,
    pub video_provider: Option<String>,
    pub caller_display_name: Option<String>,
    pub caller_display_name_presentation: Presentation,
    pub post_dial_wait: Option<String>,
    pub extras: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::value_object::DisconnectCode;

    fn create_test_call() -> Call {
        Call::new(
            SessionId::new(),
            AccountHandle::new("pstn", "A0"),
            Address::parse("650-555-1212").unwrap(),
            CallDirection::Outgoing,
        )
    }

    #[test]
    fn test_call_lifecycle() {
        let mut call = create_test_call();
        assert_eq!(call.state(), CallState::New);
        assert!(!call.is_acknowledged());

        call.set_dialing().unwrap();
        assert!(call.is_acknowledged());

        call.set_active().unwrap();
        assert!(call.snapshot().connected_at.is_some());

        call.set_on_hold().unwrap();
        call.set_active().unwrap();

        call.set_disconnected(DisconnectCause::new(DisconnectCode::Local))
            .unwrap();
        assert!(call.is_terminal());
        assert_eq!(call.disconnect_cause().unwrap().code, DisconnectCode::Local);

        let states: Vec<CallState> = call
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                CallEvent::StateChanged(s) => Some(s.to),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                CallState::Dialing,
                CallState::Active,
                CallState::Holding,
                CallState::Active,
                CallState::Disconnected
            ]
        );
        assert!(call.take_events().is_empty());
    }

    #[test]
    fn test_invalid_state_transition() {
        let mut call = create_test_call();
        let result = call.set_active();
        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
        assert_eq!(call.state(), CallState::New);
        assert!(call.take_events().is_empty());
    }

    #[test]
    fn test_cannot_transition_from_disconnected() {
        let mut call = create_test_call();
        call.set_disconnected(DisconnectCause::new(DisconnectCode::Canceled))
            .unwrap();

        assert_eq!(
            call.set_active(),
            Err(DomainError::SessionNotActive(*call.id()))
        );
        assert!(call.set_capabilities(CallCapabilities::HOLD).is_err());
        assert!(call
            .set_disconnected(DisconnectCause::new(DisconnectCode::Remote))
            .is_err());
        assert_eq!(call.disconnect_cause().unwrap().code, DisconnectCode::Canceled);
    }

    #[test]
    fn test_capabilities_change_only_recorded_on_change() {
        let mut call = create_test_call();
        call.set_capabilities(CallCapabilities::HOLD).unwrap();
        call.set_capabilities(CallCapabilities::HOLD).unwrap();
        assert_eq!(call.take_events().len(), 1);
    }

    #[test]
    fn test_existing_call() {
        let call = Call::existing(
            SessionId::new(),
            AccountHandle::new("pstn", "A0"),
            Address::parse("650-555-0000").unwrap(),
            CallDirection::Incoming,
            CallState::Active,
        )
        .unwrap();
        assert!(call.is_acknowledged());
        assert_eq!(call.state(), CallState::Active);

        let terminal = Call::existing(
            SessionId::new(),
            AccountHandle::new("pstn", "A0"),
            Address::parse("650-555-0000").unwrap(),
            CallDirection::Incoming,
            CallState::Disconnected,
        );
        assert!(terminal.is_err());
    }

    #[test]
    fn test_conferenceable_excludes_self() {
        let mut call = create_test_call();
        let own = *call.id();
        let peer = SessionId::new();
        call.set_conferenceable(vec![own, peer]).unwrap();
        assert_eq!(call.conferenceable(), &[peer]);

        call.remove_conferenceable(&peer);
        assert!(call.conferenceable().is_empty());
    }

    #[test]
    fn test_yield_is_per_session_and_cleared_by_hold() {
        let mut call = create_test_call();
        call.set_dialing().unwrap();
        call.set_active().unwrap();

        let first = SessionId::new();
        let second = SessionId::new();
        call.yield_to(first);
        assert!(call.is_yielding_to(&first));
        assert!(!call.is_yielding_to(&second));

        assert_eq!(call.clear_yield(), Some(first));
        assert!(!call.is_yielding_to(&first));

        call.yield_to(second);
        call.set_on_hold().unwrap();
        assert!(!call.is_yielding_to(&second));
    }
}
