//! Events a call provider reports back to the broker

use crate::domain::call::{
    CallCapabilities, CallDirection, CallState, ConferenceState, DisconnectCause, Presentation,
    VideoState,
};
use crate::domain::shared::value_objects::{AccountHandle, Address, ConferenceId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// Acknowledges `CreateConnection`; `state` is `NEW`, `DIALING` or `RINGING`
    ConnectionCreated {
        session_id: SessionId,
        state: CallState,
        capabilities: CallCapabilities,
    },
    CreateFailed {
        session_id: SessionId,
        cause: DisconnectCause,
    },
    SetDialing { session_id: SessionId },
    SetRinging { session_id: SessionId },
    SetActive { session_id: SessionId },
    SetOnHold { session_id: SessionId },
    /// The call stays in its current state after a hold request
    HoldFailed { session_id: SessionId },
    SetDisconnected {
        session_id: SessionId,
        cause: DisconnectCause,
    },
    /// Terminal removal; the broker forgets the call
    RemoveCall { session_id: SessionId },
    CapabilitiesChanged {
        session_id: SessionId,
        capabilities: CallCapabilities,
    },
    ConferenceableChanged {
        session_id: SessionId,
        peers: Vec<SessionId>,
    },
    AddressChanged {
        session_id: SessionId,
        address: Address,
        presentation: Presentation,
    },
    CallerDisplayNameChanged {
        session_id: SessionId,
        name: Option<String>,
        presentation: Presentation,
    },
    VideoStateChanged {
        session_id: SessionId,
        video_state: VideoState,
    },
    VideoProviderChanged {
        session_id: SessionId,
        video_provider: Option<String>,
    },
    PostDialWait {
        session_id: SessionId,
        remaining: Option<String>,
    },
    ExtrasChanged {
        session_id: SessionId,
        extras: BTreeMap<String, String>,
    },
    /// Several calls were merged into a new conference
    Conferenced {
        conference_id: ConferenceId,
        account: AccountHandle,
        members: Vec<SessionId>,
        state: ConferenceState,
        capabilities: CallCapabilities,
    },
    /// A call joined (`Some`) or left (`None`) a conference
    SetConferenced {
        session_id: SessionId,
        conference_id: Option<ConferenceId>,
    },
    ConferenceStateChanged {
        conference_id: ConferenceId,
        state: ConferenceState,
    },
    ConferenceCapabilitiesChanged {
        conference_id: ConferenceId,
        capabilities: CallCapabilities,
    },
    RemoveConference { conference_id: ConferenceId },
    /// A call the provider already owns, e.g. after a service restart
    ExistingConnectionAdded {
        session_id: SessionId,
        account: AccountHandle,
        address: Address,
        direction: CallDirection,
        state: CallState,
        capabilities: CallCapabilities,
    },
}

impl ProviderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderEvent::ConnectionCreated { .. } => "connection_created",
            ProviderEvent::CreateFailed { .. } => "create_failed",
            ProviderEvent::SetDialing { .. } => "set_dialing",
            ProviderEvent::SetRinging { .. } => "set_ringing",
            ProviderEvent::SetActive { .. } => "set_active",
            ProviderEvent::SetOnHold { .. } => "set_on_hold",
            ProviderEvent::HoldFailed { .. } => "hold_failed",
            ProviderEvent::SetDisconnected { .. } => "set_disconnected",
            ProviderEvent::RemoveCall { .. } => "remove_call",
            ProviderEvent::CapabilitiesChanged { .. } => "capabilities_changed",
            ProviderEvent::ConferenceableChanged { .. } => "conferenceable_changed",
            ProviderEvent::AddressChanged { .. } => "address_changed",
            ProviderEvent::CallerDisplayNameChanged { .. } => "caller_display_name_changed",
            ProviderEvent::VideoStateChanged { .. } => "video_state_changed",
            ProviderEvent::VideoProviderChanged { .. } => "video_provider_changed",
            ProviderEvent::PostDialWait { .. } => "post_dial_wait",
            ProviderEvent::ExtrasChanged { .. } => "extras_changed",
            ProviderEvent::Conferenced { .. } => "conferenced",
            ProviderEvent::SetConferenced { .. } => "set_conferenced",
            ProviderEvent::ConferenceStateChanged { .. } => "conference_state_changed",
            ProviderEvent::ConferenceCapabilitiesChanged { .. } => {
                "conference_capabilities_changed"
            }
            ProviderEvent::RemoveConference { .. } => "remove_conference",
            ProviderEvent::ExistingConnectionAdded { .. } => "existing_connection_added",
        }
    }

    /// The session this event is about, for per-call events
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            ProviderEvent::ConnectionCreated { session_id, .. }
            | ProviderEvent::CreateFailed { session_id, .. }
            | ProviderEvent::SetDialing { session_id }
            | ProviderEvent::SetRinging { session_id }
            | ProviderEvent::SetActive { session_id }
            | ProviderEvent::SetOnHold { session_id }
            | ProviderEvent::HoldFailed { session_id }
            | ProviderEvent::SetDisconnected { session_id, .. }
            | ProviderEvent::RemoveCall { session_id }
            | ProviderEvent::CapabilitiesChanged { session_id, .. }
            | ProviderEvent::ConferenceableChanged { session_id, .. }
            | ProviderEvent::AddressChanged { session_id, .. }
            | ProviderEvent::CallerDisplayNameChanged { session_id, .. }
            | ProviderEvent::VideoStateChanged { session_id, .. }
            | ProviderEvent::VideoProviderChanged { session_id, .. }
            | ProviderEvent::PostDialWait { session_id, .. }
            | ProviderEvent::ExtrasChanged { session_id, .. }
            | ProviderEvent::SetConferenced { session_id, .. }
            | ProviderEvent::ExistingConnectionAdded { session_id, .. } => Some(*session_id),
            ProviderEvent::Conferenced { .. }
            | ProviderEvent::ConferenceStateChanged { .. }
            | ProviderEvent::ConferenceCapabilitiesChanged { .. }
            | ProviderEvent::RemoveConference { .. } => None,
        }
    }
}
