//! callbroker - call-session orchestration broker
//!
//! Sits between call providers (connection services) and call
//! controllers (UIs, remote clients). Providers report connection state,
//! controllers issue commands, and a single serialized broker owns the
//! authoritative session registry and fans every change out to all
//! attached controllers.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::Result;
