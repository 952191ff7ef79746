//! Server-side TLS wrapping
//!
//! Turns a policy into a rustls `ServerConfig` and a `TlsAcceptor` able to
//! layer TLS over an already-connected socket.

use std::sync::Arc;

use log::debug;
use rustls::crypto::CryptoProvider;
use rustls::server::WebPkiClientVerifier;
use rustls::{ServerConfig, SupportedCipherSuite};
use tokio_rustls::TlsAcceptor;

use crate::error::SecurityError;
use crate::security::policy::{ClientAuth, SslPolicy, TlsContext};

/// IANA-style name of a cipher suite, e.g. `TLS13_AES_128_GCM_SHA256`.
pub fn cipher_suite_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// Builds the server configuration for one context, applying the client
/// authentication mode and the cipher-suite allow-list.
pub fn server_config(
    context: TlsContext,
    client_auth: ClientAuth,
    cipher_suites: Option<&[String]>,
) -> Result<Arc<ServerConfig>, SecurityError> {
    let provider = Arc::new(restrict_cipher_suites(&context.provider, cipher_suites)?);

    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(&context.versions)
        .map_err(|_| SecurityError::NoUsableCipherSuite(format!("{:?}", context.versions)))?;

    let builder = match client_auth {
        ClientAuth::None => builder.with_no_client_auth(),
        ClientAuth::Want | ClientAuth::Need => {
            let roots = context
                .client_roots
                .ok_or(SecurityError::MissingClientRoots)?;
            let mut verifier = WebPkiClientVerifier::builder_with_provider(roots, provider);
            if client_auth == ClientAuth::Want {
                verifier = verifier.allow_unauthenticated();
            }
            let verifier = verifier
                .build()
                .map_err(|e| SecurityError::ClientVerifier(e.to_string()))?;
            builder.with_client_cert_verifier(verifier)
        }
    };

    let config = builder.with_single_cert(context.certificates, context.private_key)?;
    Ok(Arc::new(config))
}

/// Resolves everything a handshake needs for `protocol` up front, so that a
/// configuration problem surfaces before any socket is touched.
pub fn server_acceptor(
    policy: &dyn SslPolicy,
    protocol: Option<&str>,
) -> Result<TlsAcceptor, SecurityError> {
    let context = policy.context(protocol)?;
    let config = server_config(context, policy.client_auth(), policy.enabled_cipher_suites())?;
    debug!(
        "TLS acceptor ready for protocol {} (client auth {:?})",
        protocol.unwrap_or("default"),
        policy.client_auth()
    );
    Ok(TlsAcceptor::from(config))
}

fn restrict_cipher_suites(
    provider: &CryptoProvider,
    allowed: Option<&[String]>,
) -> Result<CryptoProvider, SecurityError> {
    let mut provider = provider.clone();
    let Some(names) = allowed else {
        return Ok(provider);
    };

    let mut selected = Vec::with_capacity(names.len());
    for name in names {
        let suite = provider
            .cipher_suites
            .iter()
            .find(|suite| cipher_suite_name(suite).eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| SecurityError::UnknownCipherSuite(name.clone()))?;
        selected.push(suite);
    }
    provider.cipher_suites = selected;
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::policy::protocol_versions;

    fn ring() -> CryptoProvider {
        rustls::crypto::ring::default_provider()
    }

    #[test]
    fn test_no_allow_list_keeps_defaults() {
        let provider = ring();
        let restricted = restrict_cipher_suites(&provider, None).unwrap();
        assert_eq!(restricted.cipher_suites.len(), provider.cipher_suites.len());
    }

    #[test]
    fn test_allow_list_filters_in_order() {
        let names = vec![
            "TLS13_CHACHA20_POLY1305_SHA256".to_string(),
            "tls13_aes_128_gcm_sha256".to_string(),
        ];
        let restricted = restrict_cipher_suites(&ring(), Some(&names)).unwrap();
        let kept: Vec<String> = restricted.cipher_suites.iter().map(cipher_suite_name).collect();
        assert_eq!(
            kept,
            vec!["TLS13_CHACHA20_POLY1305_SHA256", "TLS13_AES_128_GCM_SHA256"]
        );
    }

    #[test]
    fn test_unknown_cipher_rejected() {
        let names = vec!["TLS_RSA_WITH_RC4_128_MD5".to_string()];
        let err = restrict_cipher_suites(&ring(), Some(&names)).unwrap_err();
        assert!(matches!(err, SecurityError::UnknownCipherSuite(_)));
    }

    #[test]
    fn test_client_auth_without_roots_fails() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let context = TlsContext {
            provider: Arc::new(ring()),
            versions: protocol_versions(None).unwrap(),
            certificates: vec![certified.cert.der().clone()],
            private_key: rustls::pki_types::PrivateKeyDer::Pkcs8(
                certified.key_pair.serialize_der().into(),
            ),
            client_roots: None,
        };
        let err = server_config(context, ClientAuth::Need, None).unwrap_err();
        assert!(matches!(err, SecurityError::MissingClientRoots));
    }

    #[test]
    fn test_tls13_only_with_tls12_suites_fails() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let context = TlsContext {
            provider: Arc::new(ring()),
            versions: protocol_versions(Some("TLSv1.3")).unwrap(),
            certificates: vec![certified.cert.der().clone()],
            private_key: rustls::pki_types::PrivateKeyDer::Pkcs8(
                certified.key_pair.serialize_der().into(),
            ),
            client_roots: None,
        };
        let tls12_only = vec!["TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256".to_string()];
        let err = server_config(context, ClientAuth::None, Some(&tls12_only)).unwrap_err();
        assert!(matches!(err, SecurityError::NoUsableCipherSuite(_)));
    }
}
