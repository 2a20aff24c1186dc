//! Shared identifiers, the relay content model, and error utilities used
//! across all topicdesk crates.

pub mod error;
pub mod html;
pub mod types;

pub use error::{Error, Result};
