//! Control connection management
//!
//! Session state, the control-channel transport, reply writing, the
//! per-session read/dispatch loop, and the registry of live sessions.

pub mod handle;
pub mod io;
pub mod observer;
pub mod registry;
pub mod session;
pub mod transport;
pub mod writer;

pub use handle::{SessionHandle, SessionId};
pub use io::{ControlUpgrade, FtpConnection, Termination};
pub use observer::{ConnectionObserver, LoggingObserver};
pub use registry::ConnectionManager;
pub use session::Session;
pub use transport::Transport;
pub use writer::ResponseWriter;
