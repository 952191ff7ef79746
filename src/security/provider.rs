//! rustls-backed `SslPolicy`
//!
//! Loads PEM material once at startup; every `context` call hands out
//! clones, so the policy can be shared by all sessions of a listener.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use log::info;
use rustls::RootCertStore;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::config::SslConfig;
use crate::error::SecurityError;
use crate::security::policy::{ClientAuth, SslPolicy, TlsContext, protocol_versions};
use crate::security::socket::server_acceptor;

pub struct RustlsSslPolicy {
    provider: Arc<CryptoProvider>,
    certificates: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
    client_roots: Option<Arc<RootCertStore>>,
    client_auth: ClientAuth,
    cipher_suites: Option<Vec<String>>,
}

impl RustlsSslPolicy {
    /// Builds a policy from an in-memory certificate chain and key.
    pub fn new(
        certificates: Vec<CertificateDer<'static>>,
        private_key: PrivateKeyDer<'static>,
    ) -> Self {
        Self {
            provider: Arc::new(rustls::crypto::ring::default_provider()),
            certificates,
            private_key,
            client_roots: None,
            client_auth: ClientAuth::None,
            cipher_suites: None,
        }
    }

    /// Loads the policy described by the `[ssl]` configuration table and
    /// checks that a default context can actually be built from it.
    pub fn from_config(config: &SslConfig) -> Result<Self, SecurityError> {
        let certificates = load_certificates(&config.certificate)?;
        let private_key = load_private_key(&config.private_key)?;

        let mut policy = Self::new(certificates, private_key)
            .with_client_auth(config.client_auth)
            .with_cipher_suites(config.cipher_suites.clone());

        if let Some(path) = &config.client_ca {
            policy = policy.with_client_roots(load_root_store(path)?);
        }

        server_acceptor(&policy, None)?;
        info!(
            "Loaded TLS certificate {} (client auth {:?})",
            config.certificate.display(),
            policy.client_auth
        );
        Ok(policy)
    }

    pub fn with_client_auth(mut self, client_auth: ClientAuth) -> Self {
        self.client_auth = client_auth;
        self
    }

    pub fn with_client_roots(mut self, roots: RootCertStore) -> Self {
        self.client_roots = Some(Arc::new(roots));
        self
    }

    pub fn with_cipher_suites(mut self, cipher_suites: Option<Vec<String>>) -> Self {
        self.cipher_suites = cipher_suites;
        self
    }
}

impl SslPolicy for RustlsSslPolicy {
    fn context(&self, protocol: Option<&str>) -> Result<TlsContext, SecurityError> {
        Ok(TlsContext {
            provider: Arc::clone(&self.provider),
            versions: protocol_versions(protocol)?,
            certificates: self.certificates.clone(),
            private_key: self.private_key.clone_key(),
            client_roots: self.client_roots.clone(),
        })
    }

    fn enabled_cipher_suites(&self) -> Option<&[String]> {
        self.cipher_suites.as_deref()
    }

    fn client_auth(&self) -> ClientAuth {
        self.client_auth
    }
}

/// Reads every certificate from a PEM file.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, SecurityError> {
    let mut reader = open_pem(path)?;
    let certificates = read_certificates(&mut reader).map_err(|source| SecurityError::Pem {
        path: path.to_path_buf(),
        source,
    })?;
    if certificates.is_empty() {
        return Err(SecurityError::MissingCertificate(path.to_path_buf()));
    }
    Ok(certificates)
}

/// Reads the first private key (PKCS#8, PKCS#1 or SEC1) from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, SecurityError> {
    let mut reader = open_pem(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| SecurityError::Pem {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| SecurityError::MissingPrivateKey(path.to_path_buf()))
}

/// Builds the trust store used to verify client certificates.
pub fn load_root_store(path: &Path) -> Result<RootCertStore, SecurityError> {
    let mut roots = RootCertStore::empty();
    for certificate in load_certificates(path)? {
        roots.add(certificate)?;
    }
    Ok(roots)
}

fn open_pem(path: &Path) -> Result<BufReader<File>, SecurityError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| SecurityError::Pem {
            path: path.to_path_buf(),
            source,
        })
}

fn read_certificates(reader: &mut dyn BufRead) -> std::io::Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(reader).collect()
}
