//! Audio coordinator adapters

use crate::domain::audio::{AudioCoordinator, AudioDirective, AudioMode, AudioRoute};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Logs every directive. Used when the host has no audio stack of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudioCoordinator;

impl AudioCoordinator for TracingAudioCoordinator {
    fn request_focus(&self) {
        info!("Audio focus requested");
    }

    fn abandon_focus(&self) {
        info!("Audio focus abandoned");
    }

    fn set_mode(&self, mode: AudioMode) {
        debug!(?mode, "Audio mode");
    }

    fn set_mute(&self, muted: bool) {
        debug!(muted, "Microphone mute");
    }

    fn set_route(&self, route: AudioRoute) {
        debug!(?route, "Audio route");
    }
}

/// Keeps every directive in arrival order
#[derive(Debug, Default)]
pub struct RecordingAudioCoordinator {
    directives: Mutex<Vec<AudioDirective>>,
}

impl RecordingAudioCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directives(&self) -> Vec<AudioDirective> {
        self.directives.lock().clone()
    }

    /// Drain what has been recorded so far
    pub fn take(&self) -> Vec<AudioDirective> {
        std::mem::take(&mut *self.directives.lock())
    }

    fn record(&self, directive: AudioDirective) {
        self.directives.lock().push(directive);
    }
}

impl AudioCoordinator for RecordingAudioCoordinator {
    fn request_focus(&self) {
        self.record(AudioDirective::RequestFocus);
    }

    fn abandon_focus(&self) {
        self.record(AudioDirective::AbandonFocus);
    }

    fn set_mode(&self, mode: AudioMode) {
        self.record(AudioDirective::SetMode(mode));
    }

    fn set_mute(&self, muted: bool) {
        self.record(AudioDirective::SetMute(muted));
    }

    fn set_route(&self, route: AudioRoute) {
        self.record(AudioDirective::SetRoute(route));
    }
}
