//! Module `session`
//!
//! Defines the `Session` struct: the identity and per-client state of one
//! control connection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use rustls::pki_types::CertificateDer;

use crate::connection::handle::SessionId;
use crate::connection::transport::PeerCertificates;
use crate::server::Listener;
use crate::transfer::DataConnectionFactory;

/// State of one connected FTP client.
///
/// Addresses are fixed at accept time; the certificate chain appears once a
/// TLS handshake with a client certificate has completed.
pub struct Session {
    id: SessionId,
    client_address: SocketAddr,
    server_address: SocketAddr,
    listener: Arc<Listener>,
    data_connection: DataConnectionFactory,
    client_certificates: PeerCertificates,
    secure: bool,
    connected_at: Instant,
    attributes: HashMap<String, String>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        client_address: SocketAddr,
        server_address: SocketAddr,
        listener: Arc<Listener>,
        client_certificates: PeerCertificates,
    ) -> Self {
        let mut data_connection = DataConnectionFactory::new(id);
        data_connection.set_server_control_address(server_address.ip());

        Self {
            id,
            client_address,
            server_address,
            listener,
            data_connection,
            client_certificates,
            secure: false,
            connected_at: Instant::now(),
            attributes: HashMap::new(),
        }
    }

    // --------------------
    // Getter methods
    // --------------------

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the client's socket address.
    pub fn client_address(&self) -> SocketAddr {
        self.client_address
    }

    /// Returns the local socket address the client connected to.
    pub fn server_address(&self) -> SocketAddr {
        self.server_address
    }

    pub fn server_port(&self) -> u16 {
        self.server_address.port()
    }

    /// Returns the listener that accepted this connection.
    pub fn listener(&self) -> &Arc<Listener> {
        &self.listener
    }

    pub fn data_connection(&self) -> &DataConnectionFactory {
        &self.data_connection
    }

    pub fn data_connection_mut(&mut self) -> &mut DataConnectionFactory {
        &mut self.data_connection
    }

    /// Returns the client certificate chain, if the client authenticated
    /// with one during the TLS handshake.
    pub fn client_certificates(&self) -> Option<&[CertificateDer<'static>]> {
        self.client_certificates.get().map(Vec::as_slice)
    }

    /// Returns whether the control channel is (or is becoming) encrypted.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub(crate) fn peer_certificates_slot(&self) -> PeerCertificates {
        Arc::clone(&self.client_certificates)
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    // --------------------
    // Setter methods
    // --------------------

    pub(crate) fn set_secure(&mut self, secure: bool) {
        self.secure = secure;
    }

    /// Stores handler-defined state on the session.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.remove(name)
    }
}
