//! API interface implementations

pub mod accounts_handler;
pub mod calls_handler;
pub mod dto;
pub mod metrics_handler;
pub mod router;
pub mod state;
pub mod ws_handler;

pub use router::build_router;
pub use state::AppState;
