//! Audio bounded context - focus, mode, mute and route directives

pub mod coordinator;

pub use coordinator::{
    AudioCoordinator, AudioDirective, AudioMode, AudioRoute, AudioState, FocusTracker,
};
