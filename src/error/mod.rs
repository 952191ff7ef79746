//! Error handling
//!
//! Defines error types and their classification for the control channel.

pub mod handlers;
pub mod types;

pub use types::*;
