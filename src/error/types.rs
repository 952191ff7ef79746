//! Error types
//!
//! Defines domain-specific error types for each module of the FTP server.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed error returned by protocol handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Security configuration errors.
///
/// These are raised synchronously to whoever asked for a TLS context,
/// usually the protocol handler processing `AUTH`.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("SSL is not configured for listener {0}")]
    NotConfigured(String),

    #[error("unsupported TLS protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("unknown cipher suite: {0}")]
    UnknownCipherSuite(String),

    #[error("none of the configured cipher suites is usable with protocol {0}")]
    NoUsableCipherSuite(String),

    #[error("failed to read {path}: {source}")]
    Pem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no private key found in {0}")]
    MissingPrivateKey(PathBuf),

    #[error("no certificate found in {0}")]
    MissingCertificate(PathBuf),

    #[error("client authentication requires a client CA bundle")]
    MissingClientRoots,

    #[error("client certificate verifier: {0}")]
    ClientVerifier(String),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
}

/// Errors ending a control connection's read-dispatch loop.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("command line exceeds {limit} bytes")]
    CommandTooLong { limit: usize },

    #[error("protocol handler failed: {0}")]
    Handler(#[source] BoxError),

    #[error("control connection is closed")]
    Closed,
}

impl SessionError {
    /// Wraps an arbitrary handler failure.
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        SessionError::Handler(err.into())
    }

    /// True when the peer went away or the socket was closed underneath us.
    pub fn is_disconnect(&self) -> bool {
        match self {
            SessionError::Io(e) => !is_tls_error(e) && is_disconnect_kind(e.kind()),
            _ => false,
        }
    }

    /// True when the TLS layer rejected the peer (bad handshake, plaintext
    /// sent to a TLS socket, missing client certificate, ...).
    pub fn is_tls(&self) -> bool {
        match self {
            SessionError::Io(e) => is_tls_error(e),
            _ => false,
        }
    }
}

/// Connection registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("connection limit of {0} reached")]
    LimitReached(usize),

    #[error("session {0} is already registered")]
    Duplicate(u64),
}

/// Server startup errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid control socket address {0}")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Security(#[from] SecurityError),
}

fn is_disconnect_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

fn is_tls_error(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.downcast_ref::<rustls::Error>().is_some())
}
