//! Controller handle returned by `SessionBroker::attach_controller`

use crate::application::broker::SessionBroker;
use crate::application::controller::{ControllerCommand, ControllerEvent};
use crate::domain::audio::AudioRoute;
use crate::domain::call::VideoState;
use crate::domain::shared::value_objects::{ControllerId, SessionId};
use crate::domain::shared::Result;
use tokio::sync::mpsc;

/// One attached controller.
///
/// Events arrive in the order the broker applied them, starting with the
/// catch-up taken at attach time. Dropping the handle detaches it.
pub struct ControllerHandle {
    id: ControllerId,
    broker: SessionBroker,
    events: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl ControllerHandle {
    pub(crate) fn new(
        id: ControllerId,
        broker: SessionBroker,
        events: mpsc::UnboundedReceiver<ControllerEvent>,
    ) -> Self {
        Self { id, broker, events }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Next event; `None` once the broker has shut down
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<ControllerEvent> {
        self.events.try_recv().ok()
    }

    pub async fn execute(&self, command: ControllerCommand) -> Result<()> {
        self.broker.execute(self.id, command).await
    }

    pub async fn answer(&self, call_id: SessionId) -> Result<()> {
        self.execute(ControllerCommand::Answer {
            call_id,
            video_state: VideoState::AudioOnly,
        })
        .await
    }

    pub async fn reject(&self, call_id: SessionId) -> Result<()> {
        self.execute(ControllerCommand::Reject { call_id }).await
    }

    pub async fn disconnect(&self, call_id: SessionId) -> Result<()> {
        self.execute(ControllerCommand::Disconnect { call_id }).await
    }

    pub async fn hold(&self, call_id: SessionId) -> Result<()> {
        self.execute(ControllerCommand::Hold { call_id }).await
    }

    pub async fn unhold(&self, call_id: SessionId) -> Result<()> {
        self.execute(ControllerCommand::Unhold { call_id }).await
    }

    pub async fn mute(&self, muted: bool) -> Result<()> {
        self.execute(ControllerCommand::Mute { muted }).await
    }

    pub async fn set_audio_route(&self, route: AudioRoute) -> Result<()> {
        self.execute(ControllerCommand::SetAudioRoute { route }).await
    }

    pub async fn play_tone(&self, call_id: SessionId, digit: char) -> Result<()> {
        self.execute(ControllerCommand::PlayTone { call_id, digit })
            .await
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        self.broker.detach(self.id);
    }
}
