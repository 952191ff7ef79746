//! Response writer
//!
//! Renders replies onto the control channel's output half. The output half
//! is swapped in one step when the channel is upgraded to TLS, so replies
//! written afterwards go to the encrypted stream.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::time::timeout;

use crate::connection::handle::SessionId;
use crate::connection::observer::ConnectionObserver;
use crate::connection::transport::Transport;
use crate::protocol::FtpResponse;

pub struct ResponseWriter {
    session: SessionId,
    sink: Option<WriteHalf<Transport>>,
    server_address: Option<IpAddr>,
    observer: Option<Arc<dyn ConnectionObserver>>,
}

impl ResponseWriter {
    pub(crate) fn new(
        session: SessionId,
        sink: WriteHalf<Transport>,
        local_address: Option<SocketAddr>,
        observer: Option<Arc<dyn ConnectionObserver>>,
    ) -> Self {
        Self {
            session,
            sink: Some(sink),
            server_address: local_address.map(|addr| addr.ip()),
            observer,
        }
    }

    /// Writes one reply and flushes it.
    pub async fn write(&mut self, response: &FtpResponse) -> io::Result<()> {
        let out = response.to_string();
        if let Some(observer) = &self.observer {
            observer.response(self.session, &out);
        }

        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "response writer is closed"))?;
        sink.write_all(out.as_bytes()).await?;
        sink.flush().await
    }

    /// Local address of the control socket, for callers that need the
    /// server address but have none recorded on the session.
    pub fn fallback_server_address(&self) -> Option<IpAddr> {
        self.server_address
    }

    /// Points the writer at a new output half. The previous half must have
    /// been taken back with `take_sink` first.
    pub(crate) fn retarget(&mut self, sink: WriteHalf<Transport>, local_address: Option<SocketAddr>) {
        if let Some(addr) = local_address {
            self.server_address = Some(addr.ip());
        }
        self.sink = Some(sink);
    }

    pub(crate) fn take_sink(&mut self) -> Option<WriteHalf<Transport>> {
        self.sink.take()
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Shuts the output half down. Errors are logged, not returned.
    pub async fn close(&mut self) {
        let Some(mut sink) = self.sink.take() else {
            return;
        };

        match timeout(CLOSE_TIMEOUT, sink.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if is_disconnect(&e) => {
                debug!("[{}] Control socket already gone: {}", self.session, e);
            }
            Ok(Err(e)) => warn!("[{}] Failed to close control socket: {}", self.session, e),
            Err(_) => warn!("[{}] Timed out closing control socket", self.session),
        }
    }
}

/// Upper bound for each step of tearing a session down.
pub(crate) const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected | io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
    )
}
