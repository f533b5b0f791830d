//! Interface layer - External interfaces (API, WebSocket)
//!
//! This layer handles:
//! - REST endpoints for accounts and calls
//! - WebSocket controllers
//! - Request/response formatting

pub mod api;
