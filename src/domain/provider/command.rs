//! Commands sent from the broker to a call provider

use crate::domain::call::VideoState;
use crate::domain::shared::value_objects::{AccountHandle, Address, ConferenceId, SessionId};
use serde::{Deserialize, Serialize};

/// Every command is fire-and-forget: the provider reports its effect later
/// as a [`ProviderEvent`](super::ProviderEvent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ProviderCommand {
    CreateConnection {
        session_id: SessionId,
        account: AccountHandle,
        address: Address,
        is_incoming: bool,
    },
    /// Give up on a create request the provider never acknowledged
    Abort { session_id: SessionId },
    Answer {
        session_id: SessionId,
        video_state: VideoState,
    },
    Reject { session_id: SessionId },
    Disconnect { session_id: SessionId },
    Hold { session_id: SessionId },
    Unhold { session_id: SessionId },
    PlayTone { session_id: SessionId, digit: char },
    StopTone { session_id: SessionId },
    Conference {
        session_id: SessionId,
        other_id: SessionId,
    },
    SplitFromConference { session_id: SessionId },
    MergeConference { conference_id: ConferenceId },
    SwapConference { conference_id: ConferenceId },
    HoldConference { conference_id: ConferenceId },
    UnholdConference { conference_id: ConferenceId },
    DisconnectConference { conference_id: ConferenceId },
    ContinuePostDial { session_id: SessionId, proceed: bool },
}

impl ProviderCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderCommand::CreateConnection { .. } => "create_connection",
            ProviderCommand::Abort { .. } => "abort",
            ProviderCommand::Answer { .. } => "answer",
            ProviderCommand::Reject { .. } => "reject",
            ProviderCommand::Disconnect { .. } => "disconnect",
            ProviderCommand::Hold { .. } => "hold",
            ProviderCommand::Unhold { .. } => "unhold",
            ProviderCommand::PlayTone { .. } => "play_tone",
            ProviderCommand::StopTone { .. } => "stop_tone",
            ProviderCommand::Conference { .. } => "conference",
            ProviderCommand::SplitFromConference { .. } => "split_from_conference",
            ProviderCommand::MergeConference { .. } => "merge_conference",
            ProviderCommand::SwapConference { .. } => "swap_conference",
            ProviderCommand::HoldConference { .. } => "hold_conference",
            ProviderCommand::UnholdConference { .. } => "unhold_conference",
            ProviderCommand::DisconnectConference { .. } => "disconnect_conference",
            ProviderCommand::ContinuePostDial { .. } => "continue_post_dial",
        }
    }

    /// The session this command targets, if it targets one
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            ProviderCommand::CreateConnection { session_id, .. }
            | ProviderCommand::Abort { session_id }
            | ProviderCommand::Answer { session_id, .. }
            | ProviderCommand::Reject { session_id }
            | ProviderCommand::Disconnect { session_id }
            | ProviderCommand::Hold { session_id }
            | ProviderCommand::Unhold { session_id }
            | ProviderCommand::PlayTone { session_id, .. }
            | ProviderCommand::StopTone { session_id }
            | ProviderCommand::Conference { session_id, .. }
            | ProviderCommand::SplitFromConference { session_id }
            | ProviderCommand::ContinuePostDial { session_id, .. } => Some(*session_id),
            ProviderCommand::MergeConference { .. }
            | ProviderCommand::SwapConference { .. }
            | ProviderCommand::HoldConference { .. }
            | ProviderCommand::UnholdConference { .. }
            | ProviderCommand::DisconnectConference { .. } => None,
        }
    }
}
