//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Connection services (the loopback provider)
//! - Audio coordinator adapters
//! - Caller identity directory
//! - Prometheus metrics

pub mod audio;
pub mod identity;
pub mod metrics;
pub mod provider;
