//! Control-channel transport
//!
//! The byte stream under a session: plain TCP, a TLS handshake that has
//! been scheduled but not yet driven, or an established TLS stream over the
//! same TCP connection.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, ready};

use log::debug;
use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::{Accept, TlsAcceptor};

/// Certificate chain presented by the client, filled in once the TLS
/// handshake completes. Stays empty for plain sessions and for clients
/// without a certificate.
pub type PeerCertificates = Arc<OnceLock<Vec<CertificateDer<'static>>>>;

pub enum Transport {
    Plain(TcpStream),
    Handshaking {
        accept: Accept<TcpStream>,
        peer_certificates: PeerCertificates,
    },
    Tls(Box<TlsStream<TcpStream>>),
    /// The handshake failed and consumed the socket.
    Closed,
}

impl Transport {
    /// Layers a server-side TLS session over `stream`. Nothing is exchanged
    /// until the transport is first read from or written to.
    pub fn accept_tls(
        stream: TcpStream,
        acceptor: &TlsAcceptor,
        peer_certificates: PeerCertificates,
    ) -> Self {
        Transport::Handshaking {
            accept: acceptor.accept(stream),
            peer_certificates,
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Transport::Handshaking { .. } | Transport::Tls(_))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?
            .local_addr()
    }

    fn tcp(&self) -> Option<&TcpStream> {
        match self {
            Transport::Plain(stream) => Some(stream),
            Transport::Handshaking { accept, .. } => accept.get_ref(),
            Transport::Tls(stream) => Some(stream.get_ref().0),
            Transport::Closed => None,
        }
    }

    /// Drives a pending handshake. Returns `Ready(Ok)` once the transport
    /// is usable for application data.
    fn poll_handshake(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let Transport::Handshaking {
            accept,
            peer_certificates,
        } = self
        else {
            return Poll::Ready(Ok(()));
        };

        match ready!(Pin::new(accept).poll(cx)) {
            Ok(stream) => {
                if let Some(chain) = stream.get_ref().1.peer_certificates() {
                    let _ = peer_certificates.set(chain.to_vec());
                }
                debug!(
                    "TLS handshake complete ({:?})",
                    stream.get_ref().1.protocol_version()
                );
                *self = Transport::Tls(Box::new(stream));
                Poll::Ready(Ok(()))
            }
            Err(e) => {
                *self = Transport::Closed;
                Poll::Ready(Err(e))
            }
        }
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "control transport is closed")
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_handshake(cx))?;
        match this {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            Transport::Handshaking { .. } | Transport::Closed => Poll::Ready(Err(closed())),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_handshake(cx))?;
        match this {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
            Transport::Handshaking { .. } | Transport::Closed => Poll::Ready(Err(closed())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
            Transport::Handshaking { .. } | Transport::Closed => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            Transport::Handshaking { accept, .. } => match accept.get_mut() {
                Some(stream) => Pin::new(stream).poll_shutdown(cx),
                None => Poll::Ready(Ok(())),
            },
            Transport::Closed => Poll::Ready(Ok(())),
        }
    }
}
