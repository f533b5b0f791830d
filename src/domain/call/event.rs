//! Call domain events

use crate::domain::call::value_object::{CallCapabilities, CallState, DisconnectCause};
use crate::domain::shared::events::{DomainEvent, EventMetadata};
use crate::domain::shared::value_objects::{ConferenceId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base struct for all call events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEventBase {
    pub metadata: EventMetadata,
    pub call_id: SessionId,
}

impl CallEventBase {
    fn new(event_type: &str, call_id: SessionId) -> Self {
        Self {
            metadata: EventMetadata::new(event_type),
            call_id,
        }
    }
}

/// Call state changed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStateChanged {
    pub base: CallEventBase,
    pub from: CallState,
    pub to: CallState,
    pub cause: Option<DisconnectCause>,
}

/// Call capability bitmask changed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallCapabilitiesChanged {
    pub base: CallEventBase,
    pub capabilities: CallCapabilities,
}

/// Descriptive fields changed (address, caller identity, video, extras, post-dial)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallDetailsChanged {
    pub base: CallEventBase,
    pub field: String,
}

/// Call joined or left a conference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConferenceChanged {
    pub base: CallEventBase,
    pub conference_id: Option<ConferenceId>,
}

/// Union of all call events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CallEvent {
    StateChanged(CallStateChanged),
    CapabilitiesChanged(CallCapabilitiesChanged),
    DetailsChanged(CallDetailsChanged),
    ConferenceChanged(CallConferenceChanged),
}

impl CallEvent {
    pub(crate) fn state_changed(
        call_id: SessionId,
        from: CallState,
        to: CallState,
        cause: Option<DisconnectCause>,
    ) -> Self {
        CallEvent::StateChanged(CallStateChanged {
            base: CallEventBase::new("call.state_changed", call_id),
            from,
            to,
            cause,
        })
    }

    pub(crate) fn capabilities_changed(call_id: SessionId, capabilities: CallCapabilities) -> Self {
        CallEvent::CapabilitiesChanged(CallCapabilitiesChanged {
            base: CallEventBase::new("call.capabilities_changed", call_id),
            capabilities,
        })
    }

    pub(crate) fn details_changed(call_id: SessionId, field: &'static str) -> Self {
        CallEvent::DetailsChanged(CallDetailsChanged {
            base: CallEventBase::new("call.details_changed", call_id),
            field: field.to_string(),
        })
    }

    pub(crate) fn conference_changed(call_id: SessionId, conference_id: Option<ConferenceId>) -> Self {
        CallEvent::ConferenceChanged(CallConferenceChanged {
            base: CallEventBase::new("call.conference_changed", call_id),
            conference_id,
        })
    }

    fn base(&self) -> &CallEventBase {
        match self {
            CallEvent::StateChanged(e) => &e.base,
            CallEvent::CapabilitiesChanged(e) => &e.base,
            CallEvent::DetailsChanged(e) => &e.base,
            CallEvent::ConferenceChanged(e) => &e.base,
        }
    }

    pub fn call_id(&self) -> &SessionId {
        &self.base().call_id
    }
}

impl DomainEvent for CallEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CallEvent::StateChanged(_) => "call.state_changed",
            CallEvent::CapabilitiesChanged(_) => "call.capabilities_changed",
            CallEvent::DetailsChanged(_) => "call.details_changed",
            CallEvent::ConferenceChanged(_) => "call.conference_changed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.base().metadata.occurred_at
    }

    fn sequence(&self) -> u64 {
        self.base().metadata.sequence
    }
}
