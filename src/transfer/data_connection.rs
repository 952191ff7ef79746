//! Module `data_connection`
//!
//! The per-session factory for data connections. It remembers the
//! server's control-channel address, which passive replies fall back on,
//! and where the client last asked to be connected to (`PORT`).

use std::net::{IpAddr, SocketAddr};

use log::debug;

use crate::connection::handle::SessionId;

#[derive(Debug)]
pub struct DataConnectionFactory {
    session: SessionId,
    server_control_address: Option<IpAddr>,
    active_target: Option<SocketAddr>,
    secure: bool,
}

impl DataConnectionFactory {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            server_control_address: None,
            active_target: None,
            secure: false,
        }
    }

    /// Sets the local address of the control socket.
    pub fn set_server_control_address(&mut self, address: IpAddr) {
        self.server_control_address = Some(address);
    }

    pub fn server_control_address(&self) -> Option<IpAddr> {
        self.server_control_address
    }

    /// Records the client address given by `PORT`, replacing any earlier one.
    pub fn set_active_target(&mut self, target: SocketAddr) {
        debug!("[{}] active data connection target set to {}", self.session, target);
        self.active_target = Some(target);
    }

    pub fn active_target(&self) -> Option<SocketAddr> {
        self.active_target
    }

    /// Whether data connections should be TLS protected (`PROT P`).
    pub fn set_secure(&mut self, secure: bool) {
        self.secure = secure;
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Forgets the pending target once a transfer is over or aborted.
    pub fn close_data_connection(&mut self) {
        self.active_target = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_target_lifecycle() {
        let mut factory = DataConnectionFactory::new(7);
        assert_eq!(factory.active_target(), None);

        factory.set_active_target("10.0.0.5:2000".parse().unwrap());
        factory.set_active_target("10.0.0.5:2001".parse().unwrap());
        assert_eq!(
            factory.active_target(),
            Some("10.0.0.5:2001".parse().unwrap())
        );

        factory.close_data_connection();
        assert_eq!(factory.active_target(), None);
    }

    #[test]
    fn test_control_address() {
        let mut factory = DataConnectionFactory::new(7);
        factory.set_server_control_address("192.168.1.10".parse().unwrap());
        assert_eq!(
            factory.server_control_address(),
            Some("192.168.1.10".parse().unwrap())
        );
        assert!(!factory.is_secure());
    }
}
