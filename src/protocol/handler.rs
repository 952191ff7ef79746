//! Protocol handler contract
//!
//! The control connection knows nothing about FTP verbs. It reports its
//! lifecycle and every command line to a `ProtocolHandler`, which replies
//! through the connection's writer and may switch the channel to TLS.

use async_trait::async_trait;

use crate::connection::FtpConnection;
use crate::error::SessionError;
use crate::protocol::FtpRequest;

/// Receives the events of every control connection.
///
/// For one connection, `on_connection_opened` runs exactly once before any
/// request, requests arrive strictly in order, and `on_connection_closed`
/// runs at most once. An error from the first two ends the session.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    async fn on_connection_opened(&self, connection: &mut FtpConnection) -> Result<(), SessionError>;

    async fn on_request_received(
        &self,
        connection: &mut FtpConnection,
        request: &FtpRequest,
    ) -> Result<(), SessionError>;

    /// The writer is still usable here, so a final reply can be sent.
    async fn on_connection_closed(&self, connection: &mut FtpConnection);
}
