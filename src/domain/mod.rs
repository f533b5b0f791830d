//! Domain layer - Core business logic and rules
//!
//! This layer contains:
//! - Aggregates: calls and conferences
//! - Value Objects: identifiers, addresses, states, capabilities
//! - Registries: sessions and accounts
//! - Ports: connection services, audio coordinator, identity resolver
//! - Domain Events: things that happened to a call

pub mod account;
pub mod audio;
pub mod call;
pub mod identity;
pub mod provider;
pub mod shared;

// Re-export commonly used types
pub use shared::{DomainError, Result};
