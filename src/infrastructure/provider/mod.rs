//! Connection service implementations

pub mod loopback;

pub use loopback::{LoopbackProvider, LoopbackSettings};
