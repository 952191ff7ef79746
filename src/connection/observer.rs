//! Connection observers
//!
//! Hooks for idle bookkeeping and for auditing the raw command and reply
//! text of every session.

use log::{debug, trace};

use crate::connection::handle::SessionId;

/// Receives per-session events. Every method defaults to a no-op and none
/// can fail, so an observer never influences protocol processing.
pub trait ConnectionObserver: Send + Sync {
    /// Called each time the session is about to wait for the next command.
    fn activity(&self, _session: SessionId) {}

    /// Raw command line, before parsing.
    fn request(&self, _session: SessionId, _line: &str) {}

    /// Wire text of a reply, before it is written.
    fn response(&self, _session: SessionId, _text: &str) {}
}

/// Writes commands and replies to the `log` facade at debug level.
/// Passwords are masked.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl ConnectionObserver for LoggingObserver {
    fn activity(&self, session: SessionId) {
        trace!("[{}] waiting for command", session);
    }

    fn request(&self, session: SessionId, line: &str) {
        debug!("[{}] > {}", session, mask_password(line));
    }

    fn response(&self, session: SessionId, text: &str) {
        debug!("[{}] < {}", session, text.trim_end());
    }
}

fn mask_password(line: &str) -> String {
    match line.split_once(char::is_whitespace) {
        Some((verb, _)) if verb.eq_ignore_ascii_case("PASS") => format!("{} *****", verb),
        _ => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(mask_password("PASS hunter2"), "PASS *****");
        assert_eq!(mask_password("pass  secret words"), "pass *****");
        assert_eq!(mask_password("USER alice"), "USER alice");
        assert_eq!(mask_password("PASS"), "PASS");
    }
}
