//! Outbound controller events

use crate::domain::audio::AudioState;
use crate::domain::call::{
    CallCapabilities, CallSnapshot, CallState, ConferenceSnapshot, DisconnectCause,
};
use crate::domain::shared::value_objects::{ConferenceId, SessionId};
use serde::{Deserialize, Serialize};

/// One entry of the ordered stream every attached controller observes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    CallAdded {
        call: CallSnapshot,
    },
    StateChanged {
        call_id: SessionId,
        state: CallState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<DisconnectCause>,
    },
    CapabilitiesChanged {
        call_id: SessionId,
        capabilities: CallCapabilities,
    },
    /// Identity, address, video, extras, post-dial or conference link changed
    DetailsChanged {
        call: CallSnapshot,
    },
    CallRemoved {
        call_id: SessionId,
    },
    /// A conference and its reparented members, delivered as one unit
    ConferenceAdded {
        conference: ConferenceSnapshot,
        members: Vec<CallSnapshot>,
    },
    ConferenceChanged {
        conference: ConferenceSnapshot,
    },
    ConferenceRemoved {
        conference_id: ConferenceId,
    },
    AudioStateChanged {
        state: AudioState,
    },
}

impl ControllerEvent {
    pub fn call_id(&self) -> Option<SessionId> {
        match self {
            ControllerEvent::CallAdded { call } | ControllerEvent::DetailsChanged { call } => {
                Some(call.id)
            }
            ControllerEvent::StateChanged { call_id, .. }
            | ControllerEvent::CapabilitiesChanged { call_id, .. }
            | ControllerEvent::CallRemoved { call_id } => Some(*call_id),
            _ => None,
        }
    }
}
