//! FTP Protocol implementation
//!
//! Request parsing, response rendering and the handler contract the
//! control connection drives.

pub mod handler;
pub mod handlers;
pub mod request;
pub mod responses;

pub use handler::ProtocolHandler;
pub use handlers::BasicProtocolHandler;
pub use request::FtpRequest;
pub use responses::FtpResponse;
