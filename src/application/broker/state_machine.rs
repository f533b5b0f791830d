//! Broker state machine
//!
//! `BrokerCore` applies provider events and controller commands to a
//! [`SessionRegistry`] the caller has already locked. It performs no I/O:
//! everything outbound is appended to an [`Effects`] and dispatched by the
//! worker once the lock is released.

use crate::application::broker::effect::Effects;
use crate::application::controller::{ControllerCommand, ControllerEvent};
use crate::domain::audio::{AudioDirective, AudioState, FocusTracker};
use crate::domain::call::{
    is_dtmf_digit, Call, CallDirection, CallEvent, CallState, Conference, DisconnectCause,
    DisconnectCode, SessionRegistry,
};
use crate::domain::identity::CallerIdentity;
use crate::domain::provider::{ProviderCommand, ProviderEvent};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{
    AccountHandle, Address, ConferenceId, ProviderId, SessionId,
};
use crate::domain::shared::Result;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub struct BrokerCore {
    focus: FocusTracker,
    audio_state: AudioState,
    providers: HashSet<ProviderId>,
}

impl BrokerCore {
    pub fn new() -> Self {
        Self {
            focus: FocusTracker::new(),
            audio_state: AudioState::default(),
            providers: HashSet::new(),
        }
    }

    /// Returns false if the provider was already bound
    pub fn bind_provider(&mut self, provider_id: ProviderId) -> bool {
        self.providers.insert(provider_id)
    }

    pub fn is_bound(&self, provider_id: &ProviderId) -> bool {
        self.providers.contains(provider_id)
    }

    pub fn audio_state(&self) -> AudioState {
        self.audio_state
    }

    pub fn has_focus(&self) -> bool {
        self.focus.is_held()
    }

    /// Everything a freshly attached controller needs to match the others
    pub fn catch_up(&self, registry: &SessionRegistry) -> Vec<ControllerEvent> {
        let mut events: Vec<ControllerEvent> = registry
            .snapshots()
            .into_iter()
            .map(|call| ControllerEvent::CallAdded { call })
            .collect();
        for conference in registry.conference_snapshots() {
            let members = conference
                .members
                .iter()
                .filter_map(|id| registry.get(id))
                .map(Call::snapshot)
                .collect();
            events.push(ControllerEvent::ConferenceAdded {
                conference,
                members,
            });
        }
        events.push(ControllerEvent::AudioStateChanged {
            state: self.audio_state,
        });
        events
    }

    pub fn create_session(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        account: AccountHandle,
        address: Address,
        direction: CallDirection,
    ) -> Result<SessionId> {
        if !self.providers.contains(&account.provider_id) {
            return Err(DomainError::ProviderNotBound(account.provider_id));
        }

        let session_id = SessionId::new();
        let call = Call::new(session_id, account.clone(), address.clone(), direction);
        let provider_id = call.provider_id().clone();
        fx.notify(ControllerEvent::CallAdded {
            call: call.snapshot(),
        });
        registry.insert(call);

        let is_incoming = direction == CallDirection::Incoming;
        fx.command(
            &provider_id,
            ProviderCommand::CreateConnection {
                session_id,
                account,
                address: address.clone(),
                is_incoming,
            },
        );
        fx.arm_timeouts.push(session_id);
        if is_incoming {
            fx.resolve.push((session_id, address));
        }

        info!(
            "Session {} created ({:?}) on provider {}",
            session_id, direction, provider_id
        );
        self.settle(registry, fx);
        Ok(session_id)
    }

    /// Apply one provider event. An error means the event was refused and
    /// left the registry as it was, except for a ringing conflict, whose
    /// rejection of the newcomer is recorded in `fx`.
    pub fn apply_provider_event(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        provider_id: &ProviderId,
        event: ProviderEvent,
    ) -> Result<()> {
        let result = self.route_provider_event(registry, fx, provider_id, event);
        self.settle(registry, fx);
        result
    }

    /// Force-disconnect and forget everything the provider owned.
    /// Returns the number of sessions affected.
    pub fn provider_lost(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        provider_id: &ProviderId,
        reason: &str,
    ) -> usize {
        self.providers.remove(provider_id);

        let mut sessions = registry.calls_for_provider(provider_id);
        sessions.sort_by_key(|id| registry.get(id).map(|call| *call.created_at()));
        for session_id in &sessions {
            let live = registry.get(session_id).map_or(false, |call| !call.is_terminal());
            if live {
                let cause = DisconnectCause::with_message(DisconnectCode::ProviderLost, reason);
                let _ = mutate(registry, fx, session_id, |call| {
                    call.clear_conference();
                    call.set_disconnected(cause)
                });
            }
            forget(registry, fx, session_id);
        }
        for conference_id in registry.conferences_for_provider(provider_id) {
            if registry.remove_conference(&conference_id).is_some() {
                fx.notify(ControllerEvent::ConferenceRemoved { conference_id });
            }
        }

        warn!(
            "Provider {} lost ({}); {} sessions disconnected",
            provider_id,
            reason,
            sessions.len()
        );
        self.settle(registry, fx);
        sessions.len()
    }

    pub fn apply_controller_command(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        command: ControllerCommand,
    ) -> Result<()> {
        let result = self.route_controller_command(registry, fx, command);
        self.settle(registry, fx);
        result
    }

    /// A provider-supplied display name is never overwritten
    pub fn identity_resolved(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        session_id: SessionId,
        identity: CallerIdentity,
    ) -> Result<()> {
        let result = mutate(registry, fx, &session_id, |call| {
            if call.caller_display_name().is_some() {
                return Ok(());
            }
            call.set_caller_display_name(identity.display_name, identity.presentation)
        });
        self.settle(registry, fx);
        result
    }

    /// Abort a session its provider never acknowledged.
    /// Returns false if the provider answered in time.
    pub fn create_timed_out(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        session_id: SessionId,
    ) -> bool {
        let provider_id = match registry.get(&session_id) {
            Some(call) if call.state() == CallState::New && !call.is_acknowledged() => {
                call.provider_id().clone()
            }
            _ => return false,
        };

        warn!(
            "Provider {} did not acknowledge session {}; aborting",
            provider_id, session_id
        );
        fx.command(&provider_id, ProviderCommand::Abort { session_id });
        let cause = DisconnectCause::with_message(
            DisconnectCode::Aborted,
            "provider did not acknowledge the session",
        );
        let _ = mutate(registry, fx, &session_id, |call| call.set_disconnected(cause));
        self.release(registry, fx, &session_id);
        forget(registry, fx, &session_id);
        self.settle(registry, fx);
        true
    }

    fn route_provider_event(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        provider_id: &ProviderId,
        event: ProviderEvent,
    ) -> Result<()> {
        if let Some(session_id) = event.session_id() {
            if !matches!(event, ProviderEvent::ExistingConnectionAdded { .. }) {
                ensure_owned(registry, provider_id, &session_id)?;
            }
        }

        match event {
            ProviderEvent::ConnectionCreated {
                session_id,
                state,
                capabilities,
            } => {
                mutate(registry, fx, &session_id, |call| {
                    call.set_capabilities(capabilities)?;
                    call.acknowledge();
                    Ok(())
                })?;
                match state {
                    CallState::New => Ok(()),
                    CallState::Dialing => mutate(registry, fx, &session_id, Call::set_dialing),
                    CallState::Ringing => self.ring(registry, fx, provider_id, session_id),
                    other => Err(DomainError::InvalidStateTransition(format!(
                        "connection {} cannot be created {}",
                        session_id, other
                    ))),
                }
            }
            ProviderEvent::CreateFailed { session_id, cause } => {
                mutate(registry, fx, &session_id, |call| call.set_disconnected(cause))?;
                self.release(registry, fx, &session_id);
                forget(registry, fx, &session_id);
                Ok(())
            }
            ProviderEvent::SetDialing { session_id } => {
                mutate(registry, fx, &session_id, Call::set_dialing)
            }
            ProviderEvent::SetRinging { session_id } => {
                self.ring(registry, fx, provider_id, session_id)
            }
            ProviderEvent::SetActive { session_id } => self.activate(registry, fx, session_id),
            ProviderEvent::SetOnHold { session_id } => {
                mutate(registry, fx, &session_id, Call::set_on_hold)
            }
            ProviderEvent::SetDisconnected { session_id, cause } => {
                mutate(registry, fx, &session_id, |call| call.set_disconnected(cause))?;
                self.release(registry, fx, &session_id);
                Ok(())
            }
            ProviderEvent::RemoveCall { session_id } => {
                let live = registry
                    .get(&session_id)
                    .map_or(false, |call| !call.is_terminal());
                if live {
                    mutate(registry, fx, &session_id, |call| {
                        call.set_disconnected(DisconnectCause::new(DisconnectCode::Unknown))
                    })?;
                    self.release(registry, fx, &session_id);
                }
                forget(registry, fx, &session_id);
                Ok(())
            }
            ProviderEvent::CapabilitiesChanged {
                session_id,
                capabilities,
            } => mutate(registry, fx, &session_id, |call| {
                call.set_capabilities(capabilities)
            }),
            ProviderEvent::ConferenceableChanged { session_id, peers } => {
                let peers = peers
                    .into_iter()
                    .filter(|peer| {
                        registry.get(peer).map_or(false, |call| {
                            call.provider_id() == provider_id && !call.is_terminal()
                        })
                    })
                    .collect::<Vec<_>>();
                mutate(registry, fx, &session_id, |call| call.set_conferenceable(peers))
            }
            ProviderEvent::AddressChanged {
                session_id,
                address,
                presentation,
            } => mutate(registry, fx, &session_id, |call| {
                call.set_address(address, presentation)
            }),
            ProviderEvent::CallerDisplayNameChanged {
                session_id,
                name,
                presentation,
            } => mutate(registry, fx, &session_id, |call| {
                call.set_caller_display_name(name, presentation)
            }),
            ProviderEvent::VideoStateChanged {
                session_id,
                video_state,
            } => mutate(registry, fx, &session_id, |call| {
                call.set_video_state(video_state)
            }),
            ProviderEvent::VideoProviderChanged {
                session_id,
                video_provider,
            } => mutate(registry, fx, &session_id, |call| {
                call.set_video_provider(video_provider)
            }),
            ProviderEvent::PostDialWait {
                session_id,
                remaining,
            } => mutate(registry, fx, &session_id, |call| {
                call.set_post_dial_wait(remaining)
            }),
            ProviderEvent::ExtrasChanged { session_id, extras } => {
                mutate(registry, fx, &session_id, |call| call.set_extras(extras))
            }
            ProviderEvent::HoldFailed { session_id } => {
                let call = registry
                    .get_mut(&session_id)
                    .ok_or(DomainError::NoSuchSession(session_id))?;
                match call.clear_yield() {
                    Some(other) => warn!(
                        "Session {} could not be held for {}; two calls may be active",
                        session_id, other
                    ),
                    None => warn!("Session {} could not be held", session_id),
                }
                Ok(())
            }
            ProviderEvent::Conferenced {
                conference_id,
                account,
                members,
                state,
                capabilities,
            } => {
                let conference =
                    Conference::new(conference_id, account, members, state, capabilities)?;
                self.conferenced(registry, fx, provider_id, conference)
            }
            ProviderEvent::SetConferenced {
                session_id,
                conference_id,
            } => self.set_conferenced(registry, fx, provider_id, session_id, conference_id),
            ProviderEvent::ConferenceStateChanged {
                conference_id,
                state,
            } => {
                ensure_conference_owned(registry, provider_id, &conference_id)?;
                if state.is_terminal() {
                    self.drop_conference(registry, fx, &conference_id);
                    return Ok(());
                }
                let conference = registry
                    .conference_mut(&conference_id)
                    .ok_or(DomainError::NoSuchConference(conference_id))?;
                if conference.state() != state {
                    conference.set_state(state)?;
                    fx.notify(ControllerEvent::ConferenceChanged {
                        conference: conference.snapshot(),
                    });
                }
                Ok(())
            }
            ProviderEvent::ConferenceCapabilitiesChanged {
                conference_id,
                capabilities,
            } => {
                ensure_conference_owned(registry, provider_id, &conference_id)?;
                let conference = registry
                    .conference_mut(&conference_id)
                    .ok_or(DomainError::NoSuchConference(conference_id))?;
                conference.set_capabilities(capabilities)?;
                fx.notify(ControllerEvent::ConferenceChanged {
                    conference: conference.snapshot(),
                });
                Ok(())
            }
            ProviderEvent::RemoveConference { conference_id } => {
                ensure_conference_owned(registry, provider_id, &conference_id)?;
                self.drop_conference(registry, fx, &conference_id);
                Ok(())
            }
            ProviderEvent::ExistingConnectionAdded {
                session_id,
                account,
                address,
                direction,
                state,
                capabilities,
            } => {
                if &account.provider_id != provider_id {
                    return Err(DomainError::ValidationError(format!(
                        "account {} does not belong to provider {}",
                        account, provider_id
                    )));
                }
                let mut call = Call::existing(session_id, account, address, direction, state)?;
                call.set_capabilities(capabilities)?;
                call.take_events();
                self.add_existing(registry, fx, provider_id, call)
            }
        }
    }

    fn route_controller_command(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        command: ControllerCommand,
    ) -> Result<()> {
        match command {
            ControllerCommand::Answer {
                call_id,
                video_state,
            } => {
                let provider_id = require_state(registry, &call_id, CallState::Ringing, "answer")?;
                self.hold_others(registry, fx, &call_id);
                fx.command(
                    &provider_id,
                    ProviderCommand::Answer {
                        session_id: call_id,
                        video_state,
                    },
                );
            }
            ControllerCommand::Reject { call_id } => {
                let provider_id = require_state(registry, &call_id, CallState::Ringing, "reject")?;
                fx.command(&provider_id, ProviderCommand::Reject { session_id: call_id });
            }
            ControllerCommand::Disconnect { call_id } => {
                let provider_id = live(registry, &call_id)?.provider_id().clone();
                fx.command(
                    &provider_id,
                    ProviderCommand::Disconnect {
                        session_id: call_id,
                    },
                );
            }
            ControllerCommand::Hold { call_id } => {
                let provider_id = require_state(registry, &call_id, CallState::Active, "hold")?;
                fx.command(&provider_id, ProviderCommand::Hold { session_id: call_id });
            }
            ControllerCommand::Unhold { call_id } => {
                let provider_id = require_state(registry, &call_id, CallState::Holding, "unhold")?;
                self.hold_others(registry, fx, &call_id);
                fx.command(&provider_id, ProviderCommand::Unhold { session_id: call_id });
            }
            ControllerCommand::Mute { muted } => {
                let next = AudioState {
                    muted,
                    ..self.audio_state
                };
                self.set_audio(registry, fx, next)?;
            }
            ControllerCommand::SetAudioRoute { route } => {
                let next = AudioState {
                    route,
                    ..self.audio_state
                };
                self.set_audio(registry, fx, next)?;
            }
            ControllerCommand::PlayTone { call_id, digit } => {
                if !is_dtmf_digit(digit) {
                    return Err(DomainError::ValidationError(format!(
                        "'{}' is not a DTMF digit",
                        digit
                    )));
                }
                let provider_id =
                    require_state(registry, &call_id, CallState::Active, "play_tone")?;
                fx.command(
                    &provider_id,
                    ProviderCommand::PlayTone {
                        session_id: call_id,
                        digit,
                    },
                );
            }
            ControllerCommand::StopTone { call_id } => {
                let provider_id = live(registry, &call_id)?.provider_id().clone();
                fx.command(&provider_id, ProviderCommand::StopTone { session_id: call_id });
            }
            ControllerCommand::PostDialContinue { call_id, proceed } => {
                let call = live(registry, &call_id)?;
                if call.post_dial_wait().is_none() {
                    return Err(DomainError::ValidationError(format!(
                        "call {} is not waiting for post-dial input",
                        call_id
                    )));
                }
                let provider_id = call.provider_id().clone();
                mutate(registry, fx, &call_id, |call| call.set_post_dial_wait(None))?;
                fx.command(
                    &provider_id,
                    ProviderCommand::ContinuePostDial {
                        session_id: call_id,
                        proceed,
                    },
                );
            }
            ControllerCommand::Conference { call_id, other_id } => {
                if call_id == other_id {
                    return Err(DomainError::ValidationError(
                        "cannot conference a call with itself".to_string(),
                    ));
                }
                let provider_id = live(registry, &call_id)?.provider_id().clone();
                if live(registry, &other_id)?.provider_id() != &provider_id {
                    return Err(DomainError::ValidationError(format!(
                        "calls {} and {} belong to different providers",
                        call_id, other_id
                    )));
                }
                fx.command(
                    &provider_id,
                    ProviderCommand::Conference {
                        session_id: call_id,
                        other_id,
                    },
                );
            }
            ControllerCommand::SplitFromConference { call_id } => {
                let call = live(registry, &call_id)?;
                if call.conference_id().is_none() {
                    return Err(DomainError::ValidationError(format!(
                        "call {} is not in a conference",
                        call_id
                    )));
                }
                let provider_id = call.provider_id().clone();
                fx.command(
                    &provider_id,
                    ProviderCommand::SplitFromConference {
                        session_id: call_id,
                    },
                );
            }
            ControllerCommand::MergeConference { conference_id } => {
                let provider_id = live_conference(registry, &conference_id)?;
                fx.command(&provider_id, ProviderCommand::MergeConference { conference_id });
            }
            ControllerCommand::SwapConference { conference_id } => {
                let provider_id = live_conference(registry, &conference_id)?;
                fx.command(&provider_id, ProviderCommand::SwapConference { conference_id });
            }
            ControllerCommand::HoldConference { conference_id } => {
                let provider_id = live_conference(registry, &conference_id)?;
                fx.command(&provider_id, ProviderCommand::HoldConference { conference_id });
            }
            ControllerCommand::UnholdConference { conference_id } => {
                let provider_id = live_conference(registry, &conference_id)?;
                let anchor = registry
                    .conference(&conference_id)
                    .and_then(|conference| conference.members().first().copied());
                if let Some(anchor) = anchor {
                    self.hold_others(registry, fx, &anchor);
                }
                fx.command(&provider_id, ProviderCommand::UnholdConference { conference_id });
            }
            ControllerCommand::DisconnectConference { conference_id } => {
                let provider_id = live_conference(registry, &conference_id)?;
                fx.command(
                    &provider_id,
                    ProviderCommand::DisconnectConference { conference_id },
                );
            }
        }
        Ok(())
    }

    /// First writer wins: a session asking to ring while another rings is
    /// rejected at its provider and disconnected as busy.
    fn ring(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        provider_id: &ProviderId,
        session_id: SessionId,
    ) -> Result<()> {
        let call = registry
            .get(&session_id)
            .ok_or(DomainError::NoSuchSession(session_id))?;
        ensure_can_enter(call, CallState::Ringing)?;

        match registry.ringing() {
            Some(ringing) if ringing != session_id => {
                fx.command(provider_id, ProviderCommand::Reject { session_id });
                let cause =
                    DisconnectCause::with_message(DisconnectCode::Busy, "another call is ringing");
                mutate(registry, fx, &session_id, |call| call.set_disconnected(cause))?;
                self.release(registry, fx, &session_id);
                forget(registry, fx, &session_id);
                Err(DomainError::RingingConflict {
                    ringing,
                    rejected: session_id,
                })
            }
            _ => mutate(registry, fx, &session_id, Call::set_ringing),
        }
    }

    fn activate(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        session_id: SessionId,
    ) -> Result<()> {
        let call = registry
            .get(&session_id)
            .ok_or(DomainError::NoSuchSession(session_id))?;
        ensure_can_enter(call, CallState::Active)?;
        self.hold_others(registry, fx, &session_id);
        mutate(registry, fx, &session_id, Call::set_active)
    }

    /// Ask every other active call to hold so only one stays audible.
    /// Members of `except`'s own conference are left alone; other
    /// conferences are held as a unit. A call already yielding to `except`
    /// is not asked twice; any other pending hold is sent again.
    fn hold_others(&mut self, registry: &mut SessionRegistry, fx: &mut Effects, except: &SessionId) {
        let keep = registry.get(except).and_then(Call::conference_id);
        let mut held_conferences = HashSet::new();

        for other in registry.active_except(except) {
            let call = match registry.get_mut(&other) {
                Some(call) => call,
                None => continue,
            };
            if call.is_yielding_to(except) {
                continue;
            }
            let provider_id = call.provider_id().clone();
            match call.conference_id() {
                Some(conference_id) if Some(conference_id) == keep => {}
                Some(conference_id) => {
                    call.yield_to(*except);
                    if held_conferences.insert(conference_id) {
                        debug!("Holding conference {} for {}", conference_id, except);
                        fx.command(
                            &provider_id,
                            ProviderCommand::HoldConference { conference_id },
                        );
                    }
                }
                None => {
                    call.yield_to(*except);
                    debug!("Holding {} for {}", other, except);
                    fx.command(&provider_id, ProviderCommand::Hold { session_id: other });
                }
            }
        }
    }

    fn conferenced(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        provider_id: &ProviderId,
        conference: Conference,
    ) -> Result<()> {
        let conference_id = *conference.id();
        if conference.provider_id() != provider_id {
            return Err(DomainError::ValidationError(format!(
                "conference {} does not belong to provider {}",
                conference_id, provider_id
            )));
        }
        if registry.conference(&conference_id).is_some() {
            return Err(DomainError::ValidationError(format!(
                "conference {} already exists",
                conference_id
            )));
        }
        for member in conference.members() {
            ensure_owned(registry, provider_id, member)?;
            live(registry, member)?;
        }

        // Members move in without their own deltas; controllers learn about
        // the new parent from the single ConferenceAdded below.
        let members = conference.members().to_vec();
        for member in &members {
            let previous = registry.get(member).and_then(Call::conference_id);
            if let Some(previous) = previous {
                self.leave_conference(registry, fx, &previous, member);
            }
            if let Some(call) = registry.get_mut(member) {
                call.set_conference(Some(conference_id))?;
                call.take_events();
            }
        }

        let snapshot = conference.snapshot();
        registry.insert_conference(conference);
        let members = members
            .iter()
            .filter_map(|id| registry.get(id))
            .map(Call::snapshot)
            .collect::<Vec<_>>();
        info!(
            "Conference {} formed on {} with {} members",
            conference_id,
            provider_id,
            members.len()
        );
        fx.notify(ControllerEvent::ConferenceAdded {
            conference: snapshot,
            members,
        });
        Ok(())
    }

    fn set_conferenced(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        provider_id: &ProviderId,
        session_id: SessionId,
        conference_id: Option<ConferenceId>,
    ) -> Result<()> {
        let current = live(registry, &session_id)?.conference_id();
        if current == conference_id {
            return Ok(());
        }

        let joined = match conference_id {
            Some(target) => {
                ensure_conference_owned(registry, provider_id, &target)?;
                let conference = registry
                    .conference_mut(&target)
                    .ok_or(DomainError::NoSuchConference(target))?;
                conference.add_member(session_id)?;
                Some(conference.snapshot())
            }
            None => None,
        };

        if let Some(previous) = current {
            self.leave_conference(registry, fx, &previous, &session_id);
        }
        mutate(registry, fx, &session_id, |call| call.set_conference(conference_id))?;
        if let Some(conference) = joined {
            fx.notify(ControllerEvent::ConferenceChanged { conference });
        }
        Ok(())
    }

    fn add_existing(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        provider_id: &ProviderId,
        call: Call,
    ) -> Result<()> {
        let session_id = *call.id();
        if registry.contains(&session_id) {
            return Err(DomainError::ValidationError(format!(
                "session {} already exists",
                session_id
            )));
        }
        if call.state() == CallState::Ringing {
            if let Some(ringing) = registry.ringing() {
                fx.command(provider_id, ProviderCommand::Reject { session_id });
                return Err(DomainError::RingingConflict {
                    ringing,
                    rejected: session_id,
                });
            }
        }

        let state = call.state();
        let resolve = (call.direction() == CallDirection::Incoming).then(|| call.address().clone());
        fx.notify(ControllerEvent::CallAdded {
            call: call.snapshot(),
        });
        registry.insert(call);
        info!(
            "Existing session {} added by {} in {}",
            session_id, provider_id, state
        );

        if state == CallState::Active {
            self.hold_others(registry, fx, &session_id);
        }
        if let Some(address) = resolve {
            fx.resolve.push((session_id, address));
        }
        Ok(())
    }

    /// Detach a call that just became terminal from its conference and
    /// from its peers' conferenceable lists.
    fn release(&mut self, registry: &mut SessionRegistry, fx: &mut Effects, session_id: &SessionId) {
        let (conference_id, provider_id) = match registry.get_mut(session_id) {
            Some(call) => {
                let conference_id = call.conference_id();
                call.clear_conference();
                (conference_id, call.provider_id().clone())
            }
            None => return,
        };

        if let Some(conference_id) = conference_id {
            self.leave_conference(registry, fx, &conference_id, session_id);
        }
        for peer in registry.calls_for_provider(&provider_id) {
            if peer != *session_id {
                let _ = mutate(registry, fx, &peer, |call| {
                    call.remove_conferenceable(session_id);
                    Ok(())
                });
            }
        }
    }

    fn leave_conference(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        conference_id: &ConferenceId,
        member: &SessionId,
    ) {
        let conference = match registry.conference_mut(conference_id) {
            Some(conference) => conference,
            None => return,
        };
        if !conference.remove_member(member) {
            return;
        }
        if conference.is_empty() {
            registry.remove_conference(conference_id);
            info!("Conference {} removed: last member left", conference_id);
            fx.notify(ControllerEvent::ConferenceRemoved {
                conference_id: *conference_id,
            });
        } else {
            fx.notify(ControllerEvent::ConferenceChanged {
                conference: conference.snapshot(),
            });
        }
    }

    fn drop_conference(
        &mut self,
        registry: &mut SessionRegistry,
        fx: &mut Effects,
        conference_id: &ConferenceId,
    ) {
        let conference = match registry.remove_conference(conference_id) {
            Some(conference) => conference,
            None => return,
        };
        for member in conference.members() {
            let _ = mutate(registry, fx, member, |call| {
                if call.is_terminal() {
                    call.clear_conference();
                    return Ok(());
                }
                call.set_conference(None)
            });
        }
        info!("Conference {} removed", conference_id);
        fx.notify(ControllerEvent::ConferenceRemoved {
            conference_id: *conference_id,
        });
    }

    fn set_audio(
        &mut self,
        registry: &SessionRegistry,
        fx: &mut Effects,
        next: AudioState,
    ) -> Result<()> {
        if registry.live_count() == 0 {
            return Err(DomainError::ValidationError(
                "no live call to apply audio settings to".to_string(),
            ));
        }
        if next == self.audio_state {
            return Ok(());
        }
        if next.muted != self.audio_state.muted {
            fx.audio.push(AudioDirective::SetMute(next.muted));
        }
        if next.route != self.audio_state.route {
            fx.audio.push(AudioDirective::SetRoute(next.route));
        }
        self.audio_state = next;
        fx.notify(ControllerEvent::AudioStateChanged { state: next });
        Ok(())
    }

    /// Recompute focus after a mutation. Mute does not outlive the last
    /// call holding focus.
    fn settle(&mut self, registry: &SessionRegistry, fx: &mut Effects) {
        let focus_count = registry.focus_count();
        let releasing = self.focus.is_held() && focus_count == 0;
        fx.audio.extend(self.focus.update(focus_count));

        if releasing && self.audio_state.muted {
            self.audio_state.muted = false;
            fx.audio.push(AudioDirective::SetMute(false));
            fx.notify(ControllerEvent::AudioStateChanged {
                state: self.audio_state,
            });
        }
    }
}

impl Default for BrokerCore {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `f` to a call and move the events it recorded into `fx`
fn mutate<T>(
    registry: &mut SessionRegistry,
    fx: &mut Effects,
    session_id: &SessionId,
    f: impl FnOnce(&mut Call) -> Result<T>,
) -> Result<T> {
    let call = registry
        .get_mut(session_id)
        .ok_or(DomainError::NoSuchSession(*session_id))?;
    let result = f(call);
    for event in call.take_events() {
        fx.notify(to_controller_event(call, event));
    }
    result
}

fn to_controller_event(call: &Call, event: CallEvent) -> ControllerEvent {
    match event {
        CallEvent::StateChanged(e) => ControllerEvent::StateChanged {
            call_id: e.base.call_id,
            state: e.to,
            cause: e.cause,
        },
        CallEvent::CapabilitiesChanged(e) => ControllerEvent::CapabilitiesChanged {
            call_id: e.base.call_id,
            capabilities: e.capabilities,
        },
        CallEvent::DetailsChanged(_) | CallEvent::ConferenceChanged(_) => {
            ControllerEvent::DetailsChanged {
                call: call.snapshot(),
            }
        }
    }
}

fn forget(registry: &mut SessionRegistry, fx: &mut Effects, session_id: &SessionId) {
    if registry.remove(session_id).is_some() {
        debug!("Session {} removed", session_id);
        fx.notify(ControllerEvent::CallRemoved {
            call_id: *session_id,
        });
    }
}

fn ensure_owned(
    registry: &SessionRegistry,
    provider_id: &ProviderId,
    session_id: &SessionId,
) -> Result<()> {
    let call = registry
        .get(session_id)
        .ok_or(DomainError::NoSuchSession(*session_id))?;
    if call.provider_id() != provider_id {
        return Err(DomainError::ValidationError(format!(
            "session {} belongs to {}, not {}",
            session_id,
            call.provider_id(),
            provider_id
        )));
    }
    Ok(())
}

fn ensure_conference_owned(
    registry: &SessionRegistry,
    provider_id: &ProviderId,
    conference_id: &ConferenceId,
) -> Result<()> {
    let conference = registry
        .conference(conference_id)
        .ok_or(DomainError::NoSuchConference(*conference_id))?;
    if conference.provider_id() != provider_id {
        return Err(DomainError::ValidationError(format!(
            "conference {} belongs to {}, not {}",
            conference_id,
            conference.provider_id(),
            provider_id
        )));
    }
    Ok(())
}

fn ensure_can_enter(call: &Call, state: CallState) -> Result<()> {
    if call.is_terminal() {
        return Err(DomainError::SessionNotActive(*call.id()));
    }
    if !call.state().can_transition_to(state) {
        return Err(DomainError::InvalidStateTransition(format!(
            "call {} cannot move from {} to {}",
            call.id(),
            call.state(),
            state
        )));
    }
    Ok(())
}

fn live<'a>(registry: &'a SessionRegistry, session_id: &SessionId) -> Result<&'a Call> {
    let call = registry
        .get(session_id)
        .ok_or(DomainError::NoSuchSession(*session_id))?;
    if call.is_terminal() {
        return Err(DomainError::SessionNotActive(*session_id));
    }
    Ok(call)
}

fn require_state(
    registry: &SessionRegistry,
    session_id: &SessionId,
    state: CallState,
    operation: &str,
) -> Result<ProviderId> {
    let call = live(registry, session_id)?;
    if call.state() != state {
        return Err(DomainError::InvalidStateTransition(format!(
            "{} requires {} but call {} is {}",
            operation,
            state,
            session_id,
            call.state()
        )));
    }
    Ok(call.provider_id().clone())
}

fn live_conference(registry: &SessionRegistry, conference_id: &ConferenceId) -> Result<ProviderId> {
    let conference = registry
        .conference(conference_id)
        .ok_or(DomainError::NoSuchConference(*conference_id))?;
    if conference.state().is_terminal() {
        return Err(DomainError::InvalidStateTransition(format!(
            "conference {} is disconnected",
            conference_id
        )));
    }
    Ok(conference.provider_id().clone())
}
