pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod security;
pub mod server;
pub mod transfer;
pub mod utils;

pub use connection::{ControlUpgrade, FtpConnection, Termination};
pub use server::Server;
