//! Controller side of the broker - attached observers and their commands

pub mod command;
pub mod event;
pub mod handle;
pub mod hub;

pub use command::ControllerCommand;
pub use event::ControllerEvent;
pub use handle::ControllerHandle;
pub use hub::ControllerHub;
