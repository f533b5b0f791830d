//! Call value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    /// Provider reported a call arriving
    Incoming,
    /// Placed through the intent processor
    Outgoing,
}

/// Call state
///
/// `New → {Dialing | Ringing} → Active ⇄ Holding → Disconnected`.
/// `New` may go straight to `Disconnected`; `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    New,
    Dialing,
    Ringing,
    Active,
    Holding,
    Disconnected,
}

impl CallState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: CallState) -> bool {
        use CallState::*;

        match (self, new_state) {
            (New, Dialing) | (New, Ringing) | (New, Disconnected) => true,

            (Dialing, Active) | (Dialing, Disconnected) => true,

            (Ringing, Active) | (Ringing, Disconnected) => true,

            (Active, Holding) | (Active, Disconnected) => true,

            (Holding, Active) | (Holding, Disconnected) => true,

            (Disconnected, _) => false,

            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Disconnected)
    }

    /// Counts towards audio focus: live and not parked on hold
    pub fn wants_focus(&self) -> bool {
        !matches!(self, CallState::Holding | CallState::Disconnected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::New => "NEW",
            CallState::Dialing => "DIALING",
            CallState::Ringing => "RINGING",
            CallState::Active => "ACTIVE",
            CallState::Holding => "HOLDING",
            CallState::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisconnectCode {
    Unknown,
    Error,
    /// Local party hung up
    Local,
    /// Remote party hung up
    Remote,
    Canceled,
    Missed,
    Rejected,
    Busy,
    Restricted,
    Other,
    AnsweredElsewhere,
    /// Provider never acknowledged the call in time
    Aborted,
    /// Provider connection went away
    ProviderLost,
}

impl DisconnectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectCode::Unknown => "UNKNOWN",
            DisconnectCode::Error => "ERROR",
            DisconnectCode::Local => "LOCAL",
            DisconnectCode::Remote => "REMOTE",
            DisconnectCode::Canceled => "CANCELED",
            DisconnectCode::Missed => "MISSED",
            DisconnectCode::Rejected => "REJECTED",
            DisconnectCode::Busy => "BUSY",
            DisconnectCode::Restricted => "RESTRICTED",
            DisconnectCode::Other => "OTHER",
            DisconnectCode::AnsweredElsewhere => "ANSWERED_ELSEWHERE",
            DisconnectCode::Aborted => "ABORTED",
            DisconnectCode::ProviderLost => "PROVIDER_LOST",
        }
    }
}

/// Disconnect cause: code plus optional human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectCause {
    pub code: DisconnectCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DisconnectCause {
    pub fn new(code: DisconnectCode) -> Self {
        Self { code, message: None }
    }

    pub fn with_message(code: DisconnectCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}

/// Video state of a call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoState {
    #[default]
    AudioOnly,
    TxEnabled,
    RxEnabled,
    Bidirectional,
    Paused,
}

/// Presentation of an address or caller name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    #[default]
    Allowed,
    Restricted,
    Unknown,
    Payphone,
}

/// Capability bitmask of a call or conference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallCapabilities(u32);

impl CallCapabilities {
    pub const NONE: Self = Self(0);
    pub const HOLD: Self = Self(1 << 0);
    pub const SUPPORT_HOLD: Self = Self(1 << 1);
    pub const MERGE_CONFERENCE: Self = Self(1 << 2);
    pub const SWAP_CONFERENCE: Self = Self(1 << 3);
    pub const MUTE: Self = Self(1 << 4);
    pub const MANAGE_CONFERENCE: Self = Self(1 << 5);
    pub const SEPARATE_FROM_CONFERENCE: Self = Self(1 << 6);
    pub const DISCONNECT_FROM_CONFERENCE: Self = Self(1 << 7);
    pub const RESPOND_VIA_TEXT: Self = Self(1 << 8);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for CallCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Whether `digit` is a playable DTMF tone
pub fn is_dtmf_digit(digit: char) -> bool {
    matches!(digit, '0'..='9' | '*' | '#' | 'A'..='D')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_state_transitions() {
        let new = CallState::New;
        assert!(new.can_transition_to(CallState::Dialing));
        assert!(new.can_transition_to(CallState::Ringing));
        assert!(new.can_transition_to(CallState::Disconnected));
        assert!(!new.can_transition_to(CallState::Active));
        assert!(!new.can_transition_to(CallState::Holding));

        assert!(CallState::Dialing.can_transition_to(CallState::Active));
        assert!(CallState::Ringing.can_transition_to(CallState::Active));
        assert!(CallState::Active.can_transition_to(CallState::Holding));
        assert!(CallState::Holding.can_transition_to(CallState::Active));
    }

    #[test]
    fn test_invalid_state_transitions() {
        let ended = CallState::Disconnected;
        for next in [
            CallState::New,
            CallState::Dialing,
            CallState::Ringing,
            CallState::Active,
            CallState::Holding,
            CallState::Disconnected,
        ] {
            assert!(!ended.can_transition_to(next));
        }

        assert!(!CallState::Dialing.can_transition_to(CallState::Ringing));
        assert!(!CallState::Ringing.can_transition_to(CallState::Holding));
        assert!(!CallState::Active.can_transition_to(CallState::Dialing));
    }

    #[test]
    fn test_focus_states() {
        assert!(CallState::New.wants_focus());
        assert!(CallState::Ringing.wants_focus());
        assert!(CallState::Active.wants_focus());
        assert!(!CallState::Holding.wants_focus());
        assert!(!CallState::Disconnected.wants_focus());
    }

    #[test]
    fn test_dtmf_digits() {
        assert!(is_dtmf_digit('5'));
        assert!(is_dtmf_digit('#'));
        assert!(is_dtmf_digit('D'));
        assert!(!is_dtmf_digit('E'));
        assert!(!is_dtmf_digit(','));
    }
}
