//! TLS policy contract
//!
//! A listener holds at most one `SslPolicy`, shared read-only by every
//! session it accepts.

use std::fmt;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{RootCertStore, SupportedProtocolVersion};
use serde::Deserialize;

use crate::error::SecurityError;

/// Whether the server asks the client for a certificate during the handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuth {
    /// Never request a client certificate.
    #[default]
    None,
    /// Request one, but continue without it.
    Want,
    /// Abort the handshake when the client presents none.
    Need,
}

/// Everything needed to build a rustls server configuration for one
/// protocol selection.
pub struct TlsContext {
    pub provider: Arc<CryptoProvider>,
    pub versions: Vec<&'static SupportedProtocolVersion>,
    pub certificates: Vec<CertificateDer<'static>>,
    pub private_key: PrivateKeyDer<'static>,
    pub client_roots: Option<Arc<RootCertStore>>,
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("versions", &self.versions)
            .field("certificates", &self.certificates.len())
            .field("client_roots", &self.client_roots.as_ref().map(|r| r.len()))
            .finish()
    }
}

/// Security policy of a listener.
pub trait SslPolicy: Send + Sync {
    /// Builds a context for `protocol` (`"TLS"`, `"SSL"`, `"TLSv1.2"`,
    /// `"TLSv1.3"`), or the default context when `None`.
    fn context(&self, protocol: Option<&str>) -> Result<TlsContext, SecurityError>;

    /// Cipher suites to enable. `None` keeps the provider's defaults.
    fn enabled_cipher_suites(&self) -> Option<&[String]>;

    fn client_auth(&self) -> ClientAuth;
}

/// Maps an `AUTH`-style protocol name onto rustls protocol versions.
pub fn protocol_versions(
    protocol: Option<&str>,
) -> Result<Vec<&'static SupportedProtocolVersion>, SecurityError> {
    let Some(name) = protocol else {
        return Ok(rustls::DEFAULT_VERSIONS.to_vec());
    };

    match name.to_ascii_uppercase().as_str() {
        "TLS" | "SSL" | "TLS-C" | "TLS-P" => Ok(rustls::DEFAULT_VERSIONS.to_vec()),
        "TLSV1.2" => Ok(vec![&rustls::version::TLS12]),
        "TLSV1.3" => Ok(vec![&rustls::version::TLS13]),
        _ => Err(SecurityError::UnsupportedProtocol(name.to_string())),
    }
}
