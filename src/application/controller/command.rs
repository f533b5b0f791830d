//! Inbound controller commands

use crate::domain::audio::AudioRoute;
use crate::domain::call::VideoState;
use crate::domain::shared::value_objects::{ConferenceId, SessionId};
use serde::{Deserialize, Serialize};

/// A command a controller issues; each maps onto one broker operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControllerCommand {
    Answer {
        call_id: SessionId,
        #[serde(default)]
        video_state: VideoState,
    },
    Reject {
        call_id: SessionId,
    },
    Disconnect {
        call_id: SessionId,
    },
    Hold {
        call_id: SessionId,
    },
    Unhold {
        call_id: SessionId,
    },
    Mute {
        muted: bool,
    },
    SetAudioRoute {
        route: AudioRoute,
    },
    PlayTone {
        call_id: SessionId,
        digit: char,
    },
    StopTone {
        call_id: SessionId,
    },
    PostDialContinue {
        call_id: SessionId,
        proceed: bool,
    },
    Conference {
        call_id: SessionId,
        other_id: SessionId,
    },
    SplitFromConference {
        call_id: SessionId,
    },
    MergeConference {
        conference_id: ConferenceId,
    },
    SwapConference {
        conference_id: ConferenceId,
    },
    HoldConference {
        conference_id: ConferenceId,
    },
    UnholdConference {
        conference_id: ConferenceId,
    },
    DisconnectConference {
        conference_id: ConferenceId,
    },
}

impl ControllerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ControllerCommand::Answer { .. } => "answer",
            ControllerCommand::Reject { .. } => "reject",
            ControllerCommand::Disconnect { .. } => "disconnect",
            ControllerCommand::Hold { .. } => "hold",
            ControllerCommand::Unhold { .. } => "unhold",
            ControllerCommand::Mute { .. } => "mute",
            ControllerCommand::SetAudioRoute { .. } => "set_audio_route",
            ControllerCommand::PlayTone { .. } => "play_tone",
            ControllerCommand::StopTone { .. } => "stop_tone",
            ControllerCommand::PostDialContinue { .. } => "post_dial_continue",
            ControllerCommand::Conference { .. } => "conference",
            ControllerCommand::SplitFromConference { .. } => "split_from_conference",
            ControllerCommand::MergeConference { .. } => "merge_conference",
            ControllerCommand::SwapConference { .. } => "swap_conference",
            ControllerCommand::HoldConference { .. } => "hold_conference",
            ControllerCommand::UnholdConference { .. } => "unhold_conference",
            ControllerCommand::DisconnectConference { .. } => "disconnect_conference",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let id = SessionId::new();
        let json = format!(r#"{{"op":"answer","call_id":"{}"}}"#, id);
        let command: ControllerCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(
            command,
            ControllerCommand::Answer {
                call_id: id,
                video_state: VideoState::AudioOnly
            }
        );

        let route: ControllerCommand =
            serde_json::from_str(r#"{"op":"set_audio_route","route":"speaker"}"#).unwrap();
        assert_eq!(
            route,
            ControllerCommand::SetAudioRoute {
                route: AudioRoute::Speaker
            }
        );
    }
}
