//! Outbound work produced by one registry mutation
//!
//! Everything the broker must tell the outside world is collected here
//! while the registry lock is held and dispatched after it is released.

use crate::application::controller::ControllerEvent;
use crate::domain::audio::AudioDirective;
use crate::domain::provider::ProviderCommand;
use crate::domain::shared::value_objects::{Address, ProviderId, SessionId};

#[derive(Debug, Default)]
pub struct Effects {
    /// In issue order; a hold for the previous call precedes the answer
    pub provider_commands: Vec<(ProviderId, ProviderCommand)>,
    pub notifications: Vec<ControllerEvent>,
    pub audio: Vec<AudioDirective>,
    /// Incoming sessions whose caller identity should be looked up
    pub resolve: Vec<(SessionId, Address)>,
    /// Sessions awaiting a create acknowledgement
    pub arm_timeouts: Vec<SessionId>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command(&mut self, provider_id: &ProviderId, command: ProviderCommand) {
        self.provider_commands.push((provider_id.clone(), command));
    }

    pub fn notify(&mut self, event: ControllerEvent) {
        // Several detail fields changing in one step collapse to one snapshot
        if let (
            Some(ControllerEvent::DetailsChanged { call: last }),
            ControllerEvent::DetailsChanged { call },
        ) = (self.notifications.last_mut(), &event)
        {
            if last.id == call.id {
                *last = call.clone();
                return;
            }
        }
        self.notifications.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.provider_commands.is_empty()
            && self.notifications.is_empty()
            && self.audio.is_empty()
            && self.resolve.is_empty()
            && self.arm_timeouts.is_empty()
    }
}
