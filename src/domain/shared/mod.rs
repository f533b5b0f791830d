//! Shared kernel - identifiers, errors and event metadata used by every context

pub mod error;
pub mod events;
pub mod value_objects;

pub use error::{DomainError, Result};
pub use value_objects::*;
