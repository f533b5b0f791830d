//! Account bounded context - registered phone accounts and default selection

pub mod entity;
pub mod registry;

pub use entity::{Account, AccountCapabilities};
pub use registry::AccountRegistry;
