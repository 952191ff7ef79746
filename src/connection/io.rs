//! Control connection
//!
//! `FtpConnection` owns one client's control channel: it reads command
//! lines, hands them to the protocol handler in arrival order, and can swap
//! the plain TCP transport for TLS in the middle of the session.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, ReadHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::connection::handle::{SessionHandle, next_session_id};
use crate::connection::session::Session;
use crate::connection::transport::{PeerCertificates, Transport};
use crate::connection::writer::{CLOSE_TIMEOUT, ResponseWriter};
use crate::error::{SecurityError, SessionError};
use crate::protocol::request::trim_line;
use crate::protocol::{FtpRequest, FtpResponse};
use crate::security::server_acceptor;
use crate::server::{Listener, ServerContext};

/// Why a session's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The client closed its side of the connection.
    EndOfStream,
    /// The session was closed by the handler or through its handle.
    Closed,
    /// The connection was reset or aborted.
    Disconnected,
    /// The TLS layer rejected the client.
    SecurityFailure,
    /// Any other error.
    Fault,
}

/// Result of a transport upgrade request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlUpgrade {
    /// The channel now runs TLS; the handshake happens on the next I/O.
    Secured,
    /// The channel was already TLS. Nothing changed.
    AlreadySecure,
}

pub struct FtpConnection {
    context: Arc<ServerContext>,
    session: Session,
    handle: SessionHandle,
    reader: Option<BufReader<ReadHalf<Transport>>>,
    /// The last line ended in `\r`; a `\n` right after it belongs to it.
    skip_lf: bool,
    writer: ResponseWriter,
}

impl FtpConnection {
    /// Sets up a session for an accepted socket. When the listener runs
    /// implicit TLS the socket is wrapped straight away; the client
    /// certificate, if any, is recorded once the handshake completes.
    pub fn new(
        context: Arc<ServerContext>,
        stream: TcpStream,
        listener: Arc<Listener>,
    ) -> Result<Self, SessionError> {
        let client_address = stream.peer_addr()?;
        let server_address = stream.local_addr()?;
        let id = next_session_id();
        let peer_certificates = PeerCertificates::default();

        let transport = if listener.implicit_tls() {
            let ssl = listener
                .ssl()
                .ok_or_else(|| SecurityError::NotConfigured(listener.name().to_string()))?;
            let acceptor = server_acceptor(ssl.as_ref(), None)?;
            Transport::accept_tls(stream, &acceptor, Arc::clone(&peer_certificates))
        } else {
            Transport::Plain(stream)
        };

        let mut session = Session::new(
            id,
            client_address,
            server_address,
            listener,
            peer_certificates,
        );
        session.set_secure(transport.is_secure());

        let (read_half, write_half) = tokio::io::split(transport);
        let writer = ResponseWriter::new(
            id,
            write_half,
            Some(server_address),
            context.observer().cloned(),
        );

        Ok(Self {
            handle: SessionHandle::new(id, client_address),
            reader: Some(BufReader::new(read_half)),
            skip_lf: false,
            context,
            session,
            writer,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn writer(&mut self) -> &mut ResponseWriter {
        &mut self.writer
    }

    /// Handle for closing this session from elsewhere.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Serves the client until the stream ends, the session is closed, or
    /// an error occurs. Errors never escape: they are classified, logged,
    /// and the session is torn down before returning.
    ///
    /// A close request through the handle abandons whatever the session is
    /// waiting on, be it a read, a handler callback, a reply or a pending
    /// TLS handshake.
    pub async fn run(mut self) -> Termination {
        let id = self.session.id();
        let client = self.session.client_address();
        let handle = self.handle.clone();

        let served = tokio::select! {
            served = self.serve() => served,
            () = handle.close_requested() => {
                debug!("[{}] Close requested, abandoning session work", id);
                Ok(())
            }
        };

        let termination = match served {
            Ok(()) if self.handle.is_closing() => Termination::Closed,
            Ok(()) => Termination::EndOfStream,
            Err(SessionError::Closed) => Termination::Closed,
            Err(e) if e.is_disconnect() => {
                debug!("[{}] Connection to {} lost: {}", id, client, e);
                Termination::Disconnected
            }
            Err(e) if e.is_tls() => {
                warn!(
                    "[{}] Client {} did not initiate the TLS connection correctly: {}",
                    id, client, e
                );
                Termination::SecurityFailure
            }
            Err(e) => {
                warn!("[{}] Client {} error, closing session: {}", id, client, e);
                Termination::Fault
            }
        };

        self.close().await;
        self.context.connections().deregister(id).await;
        info!("[{}] Client {} disconnected ({:?})", id, client, termination);
        termination
    }

    async fn serve(&mut self) -> Result<(), SessionError> {
        let handler = Arc::clone(self.context.handler());
        handler.on_connection_opened(self).await?;

        while !self.handle.is_closing() {
            self.notify_activity();

            let Some(line) = self.read_line().await? else {
                break;
            };
            let line = trim_line(&line);
            if line.is_empty() {
                continue;
            }

            if let Some(observer) = self.context.observer() {
                observer.request(self.session.id(), line);
            }

            let request = FtpRequest::parse(line);
            handler.on_request_received(self, &request).await?;
        }

        Ok(())
    }

    fn notify_activity(&self) {
        self.handle.touch();
        if let Some(observer) = self.context.observer() {
            observer.activity(self.session.id());
        }
    }

    /// Waits for the next command line, without its terminator. `None`
    /// means the client is gone. A final line cut off by the end of the
    /// stream is still returned.
    async fn read_line(&mut self) -> Result<Option<String>, SessionError> {
        let limit = self.context.max_command_length();
        let reader = self.reader.as_mut().ok_or(SessionError::Closed)?;
        let mut buf = Vec::new();

        match read_command(reader, &mut buf, limit, &mut self.skip_lf).await? {
            LineEnd::TooLong => Err(SessionError::CommandTooLong { limit }),
            LineEnd::EndOfStream if buf.is_empty() => Ok(None),
            LineEnd::Terminated | LineEnd::EndOfStream => {
                Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
            }
        }
    }

    /// Switches the control channel to TLS.
    ///
    /// Every fallible step runs before the current transport is touched, so
    /// on error the session keeps talking plain text over the original
    /// socket. The handshake itself is driven by the next read or write.
    pub fn secure_control_channel(
        &mut self,
        protocol: &str,
    ) -> Result<ControlUpgrade, SessionError> {
        let id = self.session.id();
        let listener = Arc::clone(self.session.listener());
        let ssl = listener
            .ssl()
            .ok_or_else(|| SecurityError::NotConfigured(listener.name().to_string()))?;

        if self.session.is_secure() {
            debug!("[{}] Control channel already secure, ignoring upgrade", id);
            return Ok(ControlUpgrade::AlreadySecure);
        }

        let acceptor = server_acceptor(ssl.as_ref(), Some(protocol))?;

        if self.reader.is_none() || !self.writer.is_open() {
            return Err(SessionError::Closed);
        }
        let (Some(reader), Some(sink)) = (self.reader.take(), self.writer.take_sink()) else {
            return Err(SessionError::Closed);
        };

        let mut pending = reader.buffer();
        if self.skip_lf && pending.first() == Some(&b'\n') {
            pending = &pending[1..];
        }
        self.skip_lf = false;
        let pending = pending.len();
        if pending > 0 {
            warn!(
                "[{}] Discarding {} plain text bytes received before the TLS handshake",
                id, pending
            );
        }

        let stream = match reader.into_inner().unsplit(sink) {
            Transport::Plain(stream) => stream,
            other => {
                let secure = other.is_secure();
                self.install(other, None);
                self.session.set_secure(secure);
                return if secure {
                    Ok(ControlUpgrade::AlreadySecure)
                } else {
                    Err(SessionError::Closed)
                };
            }
        };

        let local_address = stream.local_addr().ok();
        let transport = Transport::accept_tls(
            stream,
            &acceptor,
            self.session.peer_certificates_slot(),
        );
        self.install(transport, local_address);
        self.session.set_secure(true);

        info!("[{}] Control channel switched to {}", id, protocol);
        Ok(ControlUpgrade::Secured)
    }

    fn install(&mut self, transport: Transport, local_address: Option<std::net::SocketAddr>) {
        let (read_half, write_half) = tokio::io::split(transport);
        self.reader = Some(BufReader::new(read_half));
        self.writer.retarget(write_half, local_address);
    }

    /// Tears the session down. Only the first call does anything: it
    /// notifies the handler, then releases the reader and the socket.
    pub async fn close(&mut self) {
        if !self.handle.mark_closed() {
            return;
        }

        let handler = Arc::clone(self.context.handler());
        if timeout(CLOSE_TIMEOUT, handler.on_connection_closed(self))
            .await
            .is_err()
        {
            warn!(
                "[{}] Protocol handler did not finish closing in time",
                self.session.id()
            );
        }

        self.reader = None;
        self.writer.close().await;
    }

    /// Sends a final reply to a client that will not be served, then drops
    /// the connection without involving the protocol handler.
    pub async fn refuse(mut self, response: FtpResponse) {
        self.handle.mark_closed();
        let sent = timeout(REFUSE_TIMEOUT, self.writer.write(&response)).await;
        if !matches!(sent, Ok(Ok(()))) {
            debug!(
                "[{}] Could not deliver refusal to {}",
                self.session.id(),
                self.session.client_address()
            );
        }
        self.reader = None;
        self.writer.close().await;
    }
}

const REFUSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How a call to `read_command` stopped.
#[derive(Debug, PartialEq, Eq)]
enum LineEnd {
    /// A `\r`, `\n` or `\r\n` terminator was consumed.
    Terminated,
    EndOfStream,
    /// More than `limit` bytes arrived without a terminator.
    TooLong,
}

/// Reads one line into `buf`, terminator excluded. `\r`, `\n` and `\r\n`
/// all end a line; `skip_lf` carries a trailing `\r` over to the next call
/// so that the `\n` of a split `\r\n` is not taken for an empty line.
async fn read_command<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
    skip_lf: &mut bool,
) -> io::Result<LineEnd>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(LineEnd::EndOfStream);
        }

        if *skip_lf {
            *skip_lf = false;
            if available[0] == b'\n' {
                reader.consume(1);
                continue;
            }
        }

        match available.iter().position(|b| matches!(b, b'\r' | b'\n')) {
            Some(end) => {
                if buf.len() + end > limit {
                    return Ok(LineEnd::TooLong);
                }
                buf.extend_from_slice(&available[..end]);
                *skip_lf = available[end] == b'\r';
                reader.consume(end + 1);
                return Ok(LineEnd::Terminated);
            }
            None => {
                let read = available.len();
                if buf.len() + read > limit {
                    return Ok(LineEnd::TooLong);
                }
                buf.extend_from_slice(available);
                reader.consume(read);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn lines<R: AsyncBufRead + Unpin>(mut reader: R, limit: usize) -> Vec<(String, LineEnd)> {
        let mut skip_lf = false;
        let mut out = Vec::new();
        loop {
            let mut buf = Vec::new();
            let end = read_command(&mut reader, &mut buf, limit, &mut skip_lf)
                .await
                .unwrap();
            let done = end != LineEnd::Terminated;
            if !(end == LineEnd::EndOfStream && buf.is_empty()) {
                out.push((String::from_utf8(buf).unwrap(), end));
            }
            if done {
                return out;
            }
        }
    }

    #[tokio::test]
    async fn test_read_command_accepts_every_terminator() {
        let input: &[u8] = b"USER a\r\nPASS b\rTYPE I\nNOOP\r\r\n";
        assert_eq!(
            lines(input, 64).await,
            vec![
                ("USER a".to_string(), LineEnd::Terminated),
                ("PASS b".to_string(), LineEnd::Terminated),
                ("TYPE I".to_string(), LineEnd::Terminated),
                ("NOOP".to_string(), LineEnd::Terminated),
                (String::new(), LineEnd::Terminated),
            ]
        );
    }

    #[tokio::test]
    async fn test_read_command_crlf_split_across_reads() {
        let first: &[u8] = b"NOOP\r";
        let second: &[u8] = b"\nSYST\r\n";
        assert_eq!(
            lines(first.chain(second), 64).await,
            vec![
                ("NOOP".to_string(), LineEnd::Terminated),
                ("SYST".to_string(), LineEnd::Terminated),
            ]
        );
    }

    #[tokio::test]
    async fn test_read_command_returns_unterminated_tail() {
        let input: &[u8] = b"NOOP\r\nQUIT";
        assert_eq!(
            lines(input, 64).await,
            vec![
                ("NOOP".to_string(), LineEnd::Terminated),
                ("QUIT".to_string(), LineEnd::EndOfStream),
            ]
        );
    }

    #[tokio::test]
    async fn test_read_command_honours_limit() {
        let mut input: &[u8] = b"STOR aaaaaaaaaaaaaaaaaaaaaaaa\r\n";
        let mut buf = Vec::new();
        let mut skip_lf = false;
        let end = read_command(&mut input, &mut buf, 8, &mut skip_lf).await.unwrap();
        assert_eq!(end, LineEnd::TooLong);
    }

    #[tokio::test]
    async fn test_read_command_line_at_limit_fits() {
        let mut input: &[u8] = b"ABCDEFGH\n";
        let mut buf = Vec::new();
        let mut skip_lf = false;
        let end = read_command(&mut input, &mut buf, 8, &mut skip_lf).await.unwrap();
        assert_eq!(end, LineEnd::Terminated);
        assert_eq!(buf, b"ABCDEFGH");
    }
}
