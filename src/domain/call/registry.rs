//! Session registry
//!
//! Authoritative table of live calls and conferences. Only the broker
//! worker holds it mutably; everyone else reads snapshots.

use crate::domain::call::aggregate::{Call, CallSnapshot};
use crate::domain::call::conference::{Conference, ConferenceSnapshot};
use crate::domain::call::value_object::CallState;
use crate::domain::shared::value_objects::{ConferenceId, ProviderId, SessionId};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    calls: HashMap<SessionId, Call>,
    conferences: HashMap<ConferenceId, Conference>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, call: Call) {
        self.calls.insert(*call.id(), call);
    }

    pub fn get(&self, id: &SessionId) -> Option<&Call> {
        self.calls.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Call> {
        self.calls.get_mut(id)
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<Call> {
        self.calls.remove(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.calls.contains_key(id)
    }

    pub fn insert_conference(&mut self, conference: Conference) {
        self.conferences.insert(*conference.id(), conference);
    }

    pub fn conference(&self, id: &ConferenceId) -> Option<&Conference> {
        self.conferences.get(id)
    }

    pub fn conference_mut(&mut self, id: &ConferenceId) -> Option<&mut Conference> {
        self.conferences.get_mut(id)
    }

    pub fn remove_conference(&mut self, id: &ConferenceId) -> Option<Conference> {
        self.conferences.remove(id)
    }

    /// The call currently ringing, if any. At most one exists.
    pub fn ringing(&self) -> Option<SessionId> {
        self.calls
            .values()
            .find(|c| c.state() == CallState::Ringing)
            .map(|c| *c.id())
    }

    pub fn count_in_state(&self, state: CallState) -> usize {
        self.calls.values().filter(|c| c.state() == state).count()
    }

    /// Live calls that are not parked on hold
    pub fn focus_count(&self) -> usize {
        self.calls.values().filter(|c| c.state().wants_focus()).count()
    }

    pub fn live_count(&self) -> usize {
        self.calls.values().filter(|c| !c.is_terminal()).count()
    }

    /// Active calls other than `except`
    pub fn active_except(&self, except: &SessionId) -> Vec<SessionId> {
        let mut ids: Vec<&Call> = self
            .calls
            .values()
            .filter(|c| c.id() != except && c.state() == CallState::Active)
            .collect();
        ids.sort_by_key(|c| *c.created_at());
        ids.into_iter().map(|c| *c.id()).collect()
    }

    pub fn calls_for_provider(&self, provider_id: &ProviderId) -> Vec<SessionId> {
        self.calls
            .values()
            .filter(|c| c.provider_id() == provider_id)
            .map(|c| *c.id())
            .collect()
    }

    pub fn conferences_for_provider(&self, provider_id: &ProviderId) -> Vec<ConferenceId> {
        self.conferences
            .values()
            .filter(|c| c.provider_id() == provider_id)
            .map(|c| *c.id())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Snapshots ordered by creation time
    pub fn snapshots(&self) -> Vec<CallSnapshot> {
        let mut calls: Vec<&Call> = self.calls.values().collect();
        calls.sort_by(|a, b| a.created_at().cmp(b.created_at()).then(a.id().cmp(b.id())));
        calls.into_iter().map(Call::snapshot).collect()
    }

    pub fn conference_snapshots(&self) -> Vec<ConferenceSnapshot> {
        let mut conferences: Vec<ConferenceSnapshot> =
            self.conferences.values().map(Conference::snapshot).collect();
        conferences.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        conferences
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::value_object::CallDirection;
    use crate::domain::shared::value_objects::{AccountHandle, Address};

    fn call(provider: &str) -> Call {
        Call::new(
            SessionId::new(),
            AccountHandle::new(provider, "A0"),
            Address::parse("650-555-1212").unwrap(),
            CallDirection::Outgoing,
        )
    }

    #[test]
    fn test_counts() {
        let mut registry = SessionRegistry::new();
        let mut a = call("pstn");
        a.set_ringing().unwrap();
        let ringing_id = *a.id();
        registry.insert(a);

        let mut b = call("pstn");
        b.set_dialing().unwrap();
        b.set_active().unwrap();
        b.set_on_hold().unwrap();
        registry.insert(b);

        let c = call("voip");
        registry.insert(c);

        assert_eq!(registry.ringing(), Some(ringing_id));
        assert_eq!(registry.focus_count(), 2);
        assert_eq!(registry.live_count(), 3);
        assert_eq!(registry.count_in_state(CallState::Holding), 1);
        assert_eq!(registry.calls_for_provider(&ProviderId::new("pstn")).len(), 2);
    }

    #[test]
    fn test_active_except() {
        let mut registry = SessionRegistry::new();
        let mut a = call("pstn");
        a.set_dialing().unwrap();
        a.set_active().unwrap();
        let a_id = *a.id();
        registry.insert(a);

        let b = call("pstn");
        let b_id = *b.id();
        registry.insert(b);

        assert_eq!(registry.active_except(&b_id), vec![a_id]);
        assert!(registry.active_except(&a_id).is_empty());
    }
}
