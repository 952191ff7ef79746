//! Listener description
//!
//! Where the control port is bound and how it secures connections.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::SecurityError;
use crate::security::{RustlsSslPolicy, SslPolicy};

pub struct Listener {
    name: String,
    address: SocketAddr,
    implicit_tls: bool,
    ssl: Option<Arc<dyn SslPolicy>>,
}

impl Listener {
    pub fn new(name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            name: name.into(),
            address,
            implicit_tls: false,
            ssl: None,
        }
    }

    /// Builds the listener described by the configuration, loading its TLS
    /// material if an `[ssl]` table is present.
    pub fn from_config(config: &ServerConfig, address: SocketAddr) -> Result<Self, SecurityError> {
        let mut listener = Self::new(config.listener_name.clone(), address);
        if let Some(ssl) = &config.ssl {
            listener = listener.with_ssl(Arc::new(RustlsSslPolicy::from_config(ssl)?));
        }
        Ok(listener.with_implicit_tls(config.implicit_tls))
    }

    pub fn with_ssl(mut self, ssl: Arc<dyn SslPolicy>) -> Self {
        self.ssl = Some(ssl);
        self
    }

    pub fn with_implicit_tls(mut self, implicit_tls: bool) -> Self {
        self.implicit_tls = implicit_tls;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn implicit_tls(&self) -> bool {
        self.implicit_tls
    }

    pub fn ssl(&self) -> Option<&Arc<dyn SslPolicy>> {
        self.ssl.as_ref()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("implicit_tls", &self.implicit_tls)
            .field("ssl", &self.ssl.is_some())
            .finish()
    }
}
