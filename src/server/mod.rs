//! Server core functionality
//!
//! The accept loop, the listener description and the context shared by
//! every session.

pub mod context;
pub mod core;
pub mod listener;

pub use context::ServerContext;
pub use core::Server;
pub use listener::Listener;
