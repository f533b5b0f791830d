//! Audio coordinator port
//!
//! The broker only issues directives; it never reads state back.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    Normal,
    InCall,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioRoute {
    #[default]
    Earpiece,
    Speaker,
    WiredHeadset,
    Bluetooth,
}

/// Mute/route state fanned out to controllers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioState {
    pub muted: bool,
    pub route: AudioRoute,
}

/// A single directive for the audio collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "directive", content = "value", rename_all = "snake_case")]
pub enum AudioDirective {
    RequestFocus,
    AbandonFocus,
    SetMode(AudioMode),
    SetMute(bool),
    SetRoute(AudioRoute),
}

/// Receives audio directives derived from session transitions.
///
/// Implementations must not block: the broker worker calls these inline
/// after releasing the registry lock.
pub trait AudioCoordinator: Send + Sync {
    fn request_focus(&self);

    fn abandon_focus(&self);

    fn set_mode(&self, mode: AudioMode);

    fn set_mute(&self, muted: bool);

    fn set_route(&self, route: AudioRoute);

    /// Dispatch one directive to the matching method
    fn apply(&self, directive: AudioDirective) {
        match directive {
            AudioDirective::RequestFocus => self.request_focus(),
            AudioDirective::AbandonFocus => self.abandon_focus(),
            AudioDirective::SetMode(mode) => self.set_mode(mode),
            AudioDirective::SetMute(muted) => self.set_mute(muted),
            AudioDirective::SetRoute(route) => self.set_route(route),
        }
    }
}

/// Tracks whether focus is held so each zero/non-zero edge yields exactly
/// one directive.
#[derive(Debug, Default)]
pub struct FocusTracker {
    held: bool,
}

impl FocusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Directives needed to move focus to match `focus_count`. Empty when
    /// already in the requested state.
    pub fn update(&mut self, focus_count: usize) -> Vec<AudioDirective> {
        match (self.held, focus_count > 0) {
            (false, true) => {
                self.held = true;
                vec![
                    AudioDirective::RequestFocus,
                    AudioDirective::SetMode(AudioMode::InCall),
                ]
            }
            (true, false) => {
                self.held = false;
                vec![
                    AudioDirective::AbandonFocus,
                    AudioDirective::SetMode(AudioMode::Normal),
                ]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<AudioDirective>>);

    impl AudioCoordinator for Recorder {
        fn request_focus(&self) {
            self.0.lock().push(AudioDirective::RequestFocus);
        }
        fn abandon_focus(&self) {
            self.0.lock().push(AudioDirective::AbandonFocus);
        }
        fn set_mode(&self, mode: AudioMode) {
            self.0.lock().push(AudioDirective::SetMode(mode));
        }
        fn set_mute(&self, muted: bool) {
            self.0.lock().push(AudioDirective::SetMute(muted));
        }
        fn set_route(&self, route: AudioRoute) {
            self.0.lock().push(AudioDirective::SetRoute(route));
        }
    }

    #[test]
    fn test_focus_edges_are_idempotent() {
        let mut tracker = FocusTracker::new();
        assert!(tracker.update(0).is_empty());

        let up = tracker.update(1);
        assert_eq!(up[0], AudioDirective::RequestFocus);
        assert!(tracker.is_held());
        assert!(tracker.update(2).is_empty());
        assert!(tracker.update(1).is_empty());

        let down = tracker.update(0);
        assert_eq!(down[0], AudioDirective::AbandonFocus);
        assert!(tracker.update(0).is_empty());
    }

    #[test]
    fn test_apply_dispatches() {
        let recorder = Recorder::default();
        recorder.apply(AudioDirective::SetRoute(AudioRoute::Speaker));
        recorder.apply(AudioDirective::SetMute(true));
        assert_eq!(
            *recorder.0.lock(),
            vec![
                AudioDirective::SetRoute(AudioRoute::Speaker),
                AudioDirective::SetMute(true)
            ]
        );
    }
}
