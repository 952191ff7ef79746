//! Secure transport
//!
//! The TLS policy a listener is configured with, its rustls-backed
//! implementation, and the construction of server-side acceptors used for
//! implicit TLS and for the `AUTH` upgrade.

pub mod policy;
pub mod provider;
pub mod socket;

pub use policy::{ClientAuth, SslPolicy, TlsContext};
pub use provider::RustlsSslPolicy;
pub use socket::{server_acceptor, server_config};
