//! Transfer module for FTP server
//!
//! Per-session bookkeeping for the secondary (data) connection. Socket
//! setup and passive port allocation are left to the protocol handler.

pub mod data_connection;

pub use data_connection::DataConnectionFactory;
