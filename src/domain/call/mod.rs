//! Call bounded context - sessions, conferences and the registry that holds them

pub mod aggregate;
pub mod conference;
pub mod event;
pub mod registry;
pub mod value_object;

pub use aggregate::{Call, CallSnapshot};
pub use conference::{Conference, ConferenceSnapshot, ConferenceState};
pub use event::CallEvent;
pub use registry::SessionRegistry;
pub use value_object::{
    is_dtmf_digit, CallCapabilities, CallDirection, CallState, DisconnectCause, DisconnectCode,
    Presentation, VideoState,
};
