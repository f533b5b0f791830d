//! Loopback connection service
//!
//! Plays the far end of every call locally: outgoing calls dial and may
//! auto-answer, incoming calls ring until answered, and every command is
//! acknowledged through the provider connection the way a real telephony
//! stack would.

use crate::application::provider::ProviderConnection;
use crate::domain::call::{
    CallCapabilities, CallState, ConferenceState, DisconnectCause, DisconnectCode,
};
use crate::domain::provider::{ConnectionService, ProviderCommand, ProviderError};
use crate::domain::shared::value_objects::{AccountHandle, ConferenceId, SessionId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct LoopbackSettings {
    /// Outgoing calls go ACTIVE after this long; `None` leaves them dialing
    pub auto_answer: Option<Duration>,
    pub capabilities: CallCapabilities,
}

impl Default for LoopbackSettings {
    fn default() -> Self {
        Self {
            auto_answer: Some(Duration::from_millis(500)),
            capabilities: CallCapabilities::HOLD
                | CallCapabilities::SUPPORT_HOLD
                | CallCapabilities::MUTE
                | CallCapabilities::MERGE_CONFERENCE,
        }
    }
}

#[derive(Debug, Clone)]
struct LoopbackCall {
    account: AccountHandle,
    state: CallState,
    conference: Option<ConferenceId>,
}

#[derive(Default)]
struct Lines {
    calls: HashMap<SessionId, LoopbackCall>,
    conferences: HashMap<ConferenceId, Vec<SessionId>>,
}

pub struct LoopbackProvider {
    connection: Arc<ProviderConnection>,
    settings: LoopbackSettings,
    lines: Arc<Mutex<Lines>>,
}

impl LoopbackProvider {
    pub fn new(connection: Arc<ProviderConnection>, settings: LoopbackSettings) -> Self {
        Self {
            connection,
            settings,
            lines: Arc::new(Mutex::new(Lines::default())),
        }
    }

    pub fn connection(&self) -> &Arc<ProviderConnection> {
        &self.connection
    }

    /// Calls the loopback still considers up
    pub fn live_calls(&self) -> usize {
        self.lines.lock().calls.len()
    }

    /// The far end hangs up
    pub fn remote_hangup(&self, session_id: SessionId) {
        if self.lines.lock().calls.remove(&session_id).is_some() {
            self.connection
                .set_disconnected(session_id, DisconnectCause::new(DisconnectCode::Remote));
            self.connection.remove_call(session_id);
        }
    }

    /// Move a call to `state` and report it. Returns false when the call is
    /// unknown or already there.
    fn move_to(&self, session_id: SessionId, state: CallState) -> bool {
        let moved = match self.lines.lock().calls.get_mut(&session_id) {
            Some(call) if call.state != state => {
                call.state = state;
                true
            }
            _ => false,
        };
        if moved {
            match state {
                CallState::Active => self.connection.set_active(session_id),
                CallState::Holding => self.connection.set_on_hold(session_id),
                _ => {}
            }
        }
        moved
    }

    fn hold(&self, session_id: SessionId) -> Result<(), ProviderError> {
        let state = self.lines.lock().calls.get(&session_id).map(|call| call.state);
        match state {
            Some(CallState::Active) => {
                self.move_to(session_id, CallState::Holding);
                Ok(())
            }
            Some(CallState::Holding) => Ok(()),
            Some(other) => Err(ProviderError::Rejected(format!(
                "{} cannot be held while {}",
                session_id, other
            ))),
            None => Err(ProviderError::Rejected(format!("no call {}", session_id))),
        }
    }

    fn hang_up(&self, session_id: SessionId, code: DisconnectCode) {
        if self.lines.lock().calls.remove(&session_id).is_none() {
            return;
        }
        self.connection
            .set_disconnected(session_id, DisconnectCause::new(code));
        self.connection.remove_call(session_id);
    }

    fn create(&self, session_id: SessionId, account: AccountHandle, is_incoming: bool) {
        let state = if is_incoming {
            CallState::Ringing
        } else {
            CallState::Dialing
        };
        self.lines.lock().calls.insert(
            session_id,
            LoopbackCall {
                account,
                state,
                conference: None,
            },
        );

        self.connection
            .connection_created(session_id, state, self.settings.capabilities);

        if !is_incoming {
            if let Some(delay) = self.settings.auto_answer {
                self.answer_later(session_id, delay);
            }
        }
    }

    fn answer_later(&self, session_id: SessionId, delay: Duration) {
        let lines: Weak<Mutex<Lines>> = Arc::downgrade(&self.lines);
        let connection = self.connection.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let answered = match lines.upgrade() {
                Some(lines) => match lines.lock().calls.get_mut(&session_id) {
                    Some(call) if call.state == CallState::Dialing => {
                        call.state = CallState::Active;
                        true
                    }
                    _ => false,
                },
                None => false,
            };
            if answered {
                debug!("Loopback far end answered {}", session_id);
                connection.set_active(session_id);
            }
        });
    }

    fn merge(&self, session_id: SessionId, other_id: SessionId) -> Result<(), ProviderError> {
        let conference_id = ConferenceId::new();
        let account = {
            let mut lines = self.lines.lock();
            let account = match (lines.calls.get(&session_id), lines.calls.get(&other_id)) {
                (Some(call), Some(_)) => call.account.clone(),
                _ => {
                    return Err(ProviderError::Rejected(format!(
                        "cannot conference {} with {}",
                        session_id, other_id
                    )))
                }
            };
            for id in [session_id, other_id] {
                if let Some(call) = lines.calls.get_mut(&id) {
                    call.conference = Some(conference_id);
                }
            }
            lines
                .conferences
                .insert(conference_id, vec![session_id, other_id]);
            account
        };

        self.connection.conferenced(
            conference_id,
            account,
            vec![session_id, other_id],
            ConferenceState::Active,
            self.settings.capabilities,
        );
        // A merged conference is live, held members included
        for id in [session_id, other_id] {
            self.move_to(id, CallState::Active);
        }
        Ok(())
    }

    fn split(&self, session_id: SessionId) {
        let left = {
            let mut lines = self.lines.lock();
            let conference_id = match lines.calls.get_mut(&session_id) {
                Some(call) => call.conference.take(),
                None => None,
            };
            if let Some(conference_id) = conference_id {
                if let Some(members) = lines.conferences.get_mut(&conference_id) {
                    members.retain(|member| *member != session_id);
                }
            }
            conference_id.is_some()
        };
        if left {
            self.connection.set_conferenced(session_id, None);
        }
    }

    fn conference_members(&self, conference_id: &ConferenceId) -> Option<Vec<SessionId>> {
        self.lines.lock().conferences.get(conference_id).cloned()
    }

    fn set_conference_state(&self, conference_id: ConferenceId, state: ConferenceState) {
        let member_state = match state {
            ConferenceState::Holding => CallState::Holding,
            _ => CallState::Active,
        };
        let members = match self.conference_members(&conference_id) {
            Some(members) => members,
            None => return,
        };
        for member in members {
            self.move_to(member, member_state);
        }
        self.connection.set_conference_state(conference_id, state);
    }

    fn end_conference(&self, conference_id: ConferenceId) {
        let members = match self.lines.lock().conferences.remove(&conference_id) {
            Some(members) => members,
            None => return,
        };
        for member in members {
            self.hang_up(member, DisconnectCode::Local);
        }
        self.connection.remove_conference(conference_id);
    }
}

#[async_trait]
impl ConnectionService for LoopbackProvider {
    async fn on_command(&self, command: ProviderCommand) -> Result<(), ProviderError> {
        if self.connection.is_lost() {
            return Err(ProviderError::Unreachable(format!(
                "{} is gone",
                self.connection.provider_id()
            )));
        }
        debug!("Loopback {} <- {}", self.connection.provider_id(), command.name());

        match command {
            ProviderCommand::CreateConnection {
                session_id,
                account,
                address,
                is_incoming,
            } => {
                info!(
                    "Loopback {} connection {} to {}",
                    if is_incoming { "incoming" } else { "outgoing" },
                    session_id,
                    address
                );
                self.create(session_id, account, is_incoming);
            }
            ProviderCommand::Abort { session_id } => {
                self.lines.lock().calls.remove(&session_id);
            }
            ProviderCommand::Answer { session_id, .. } | ProviderCommand::Unhold { session_id } => {
                self.move_to(session_id, CallState::Active);
            }
            ProviderCommand::Hold { session_id } => self.hold(session_id)?,
            ProviderCommand::Reject { session_id } => {
                self.hang_up(session_id, DisconnectCode::Rejected);
            }
            ProviderCommand::Disconnect { session_id } => {
                self.split(session_id);
                self.hang_up(session_id, DisconnectCode::Local);
            }
            ProviderCommand::PlayTone { session_id, digit } => {
                debug!("Loopback tone '{}' on {}", digit, session_id);
            }
            ProviderCommand::StopTone { session_id } => {
                debug!("Loopback tone stopped on {}", session_id);
            }
            ProviderCommand::Conference {
                session_id,
                other_id,
            } => self.merge(session_id, other_id)?,
            ProviderCommand::SplitFromConference { session_id } => self.split(session_id),
            ProviderCommand::MergeConference { conference_id }
            | ProviderCommand::SwapConference { conference_id } => {
                debug!("Loopback conference {} reshuffled", conference_id);
            }
            ProviderCommand::HoldConference { conference_id } => {
                self.set_conference_state(conference_id, ConferenceState::Holding);
            }
            ProviderCommand::UnholdConference { conference_id } => {
                self.set_conference_state(conference_id, ConferenceState::Active);
            }
            ProviderCommand::DisconnectConference { conference_id } => {
                self.end_conference(conference_id);
            }
            ProviderCommand::ContinuePostDial {
                session_id,
                proceed,
            } => {
                if proceed {
                    self.connection.post_dial_wait(session_id, None);
                } else {
                    self.hang_up(session_id, DisconnectCode::Local);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::provider::ProviderObserver;
    use crate::domain::provider::ProviderEvent;
    use crate::domain::shared::value_objects::{Address, ProviderId};

    #[derive(Default)]
    struct Sink(Mutex<Vec<ProviderEvent>>);

    impl ProviderObserver for Sink {
        fn on_event(&self, _provider_id: &ProviderId, event: ProviderEvent) {
            self.0.lock().push(event);
        }

        fn on_lost(&self, _provider_id: &ProviderId, _reason: &str) {}
    }

    fn loopback(auto_answer: Option<Duration>) -> (LoopbackProvider, Arc<Sink>) {
        let connection = ProviderConnection::new("loop");
        let sink = Arc::new(Sink::default());
        connection.subscribe(sink.clone());
        let settings = LoopbackSettings {
            auto_answer,
            ..LoopbackSettings::default()
        };
        (LoopbackProvider::new(connection, settings), sink)
    }

    fn create(session_id: SessionId, is_incoming: bool) -> ProviderCommand {
        ProviderCommand::CreateConnection {
            session_id,
            account: AccountHandle::new("loop", "line1"),
            address: Address::new("tel", "650-555-1212"),
            is_incoming,
        }
    }

    #[tokio::test]
    async fn test_incoming_rings_then_answers() {
        let (provider, sink) = loopback(None);
        let id = SessionId::new();

        provider.on_command(create(id, true)).await.unwrap();
        provider
            .on_command(ProviderCommand::Answer {
                session_id: id,
                video_state: Default::default(),
            })
            .await
            .unwrap();

        let events = sink.0.lock().clone();
        assert!(matches!(
            events[0],
            ProviderEvent::ConnectionCreated { state: CallState::Ringing, .. }
        ));
        assert_eq!(events[1], ProviderEvent::SetActive { session_id: id });
    }

    #[tokio::test(start_paused = true)]
    async fn test_outgoing_auto_answers() {
        let (provider, sink) = loopback(Some(Duration::from_millis(100)));
        let id = SessionId::new();

        provider.on_command(create(id, false)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let events = sink.0.lock().clone();
        assert_eq!(events.last(), Some(&ProviderEvent::SetActive { session_id: id }));
    }

    #[tokio::test]
    async fn test_disconnect_reports_then_removes() {
        let (provider, sink) = loopback(None);
        let id = SessionId::new();

        provider.on_command(create(id, false)).await.unwrap();
        provider
            .on_command(ProviderCommand::Disconnect { session_id: id })
            .await
            .unwrap();

        let events = sink.0.lock().clone();
        assert!(matches!(
            &events[1],
            ProviderEvent::SetDisconnected { cause, .. } if cause.code == DisconnectCode::Local
        ));
        assert_eq!(events[2], ProviderEvent::RemoveCall { session_id: id });
        assert_eq!(provider.live_calls(), 0);
    }

    #[tokio::test]
    async fn test_conference_of_unknown_call_is_rejected() {
        let (provider, _sink) = loopback(None);
        let id = SessionId::new();
        provider.on_command(create(id, false)).await.unwrap();

        let result = provider
            .on_command(ProviderCommand::Conference {
                session_id: id,
                other_id: SessionId::new(),
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Rejected(_))));
    }

    async fn conference_of_two(
        provider: &LoopbackProvider,
        sink: &Sink,
    ) -> (SessionId, SessionId, ConferenceId) {
        let (a, b) = (SessionId::new(), SessionId::new());
        for id in [a, b] {
            provider.on_command(create(id, true)).await.unwrap();
        }
        provider
            .on_command(ProviderCommand::Answer {
                session_id: a,
                video_state: Default::default(),
            })
            .await
            .unwrap();
        provider.on_command(ProviderCommand::Hold { session_id: a }).await.unwrap();
        provider
            .on_command(ProviderCommand::Answer {
                session_id: b,
                video_state: Default::default(),
            })
            .await
            .unwrap();
        provider
            .on_command(ProviderCommand::Conference {
                session_id: b,
                other_id: a,
            })
            .await
            .unwrap();

        let conference_id = sink
            .0
            .lock()
            .iter()
            .find_map(|event| match event {
                ProviderEvent::Conferenced { conference_id, .. } => Some(*conference_id),
                _ => None,
            })
            .unwrap();
        (a, b, conference_id)
    }

    #[tokio::test]
    async fn test_merge_reactivates_held_member() {
        let (provider, sink) = loopback(None);
        let (a, _b, _) = conference_of_two(&provider, &sink).await;

        let events = sink.0.lock().clone();
        let merged = events
            .iter()
            .position(|event| matches!(event, ProviderEvent::Conferenced { .. }))
            .unwrap();
        assert_eq!(events[merged + 1..], [ProviderEvent::SetActive { session_id: a }]);
    }

    #[tokio::test]
    async fn test_conference_hold_reports_every_member() {
        let (provider, sink) = loopback(None);
        let (a, b, conference_id) = conference_of_two(&provider, &sink).await;
        sink.0.lock().clear();

        provider
            .on_command(ProviderCommand::HoldConference { conference_id })
            .await
            .unwrap();
        assert_eq!(
            *sink.0.lock(),
            vec![
                ProviderEvent::SetOnHold { session_id: b },
                ProviderEvent::SetOnHold { session_id: a },
                ProviderEvent::ConferenceStateChanged {
                    conference_id,
                    state: ConferenceState::Holding
                },
            ]
        );
        sink.0.lock().clear();

        provider
            .on_command(ProviderCommand::UnholdConference { conference_id })
            .await
            .unwrap();
        assert_eq!(
            *sink.0.lock(),
            vec![
                ProviderEvent::SetActive { session_id: b },
                ProviderEvent::SetActive { session_id: a },
                ProviderEvent::ConferenceStateChanged {
                    conference_id,
                    state: ConferenceState::Active
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_hold_of_ringing_call_is_rejected() {
        let (provider, _sink) = loopback(None);
        let id = SessionId::new();
        provider.on_command(create(id, true)).await.unwrap();

        let result = provider.on_command(ProviderCommand::Hold { session_id: id }).await;
        assert!(matches!(result, Err(ProviderError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_lost_connection_is_unreachable() {
        let (provider, _sink) = loopback(None);
        provider.connection().lost("test");

        let result = provider.on_command(create(SessionId::new(), false)).await;
        assert!(matches!(result, Err(ProviderError::Unreachable(_))));
    }
}
