//! FTP Response handling
//!
//! Defines FTP response codes and their wire formatting.

use std::fmt;

/// Standard FTP response codes
pub const OK: u16 = 200;
pub const SYSTEM_STATUS: u16 = 211;
pub const SYSTEM_TYPE: u16 = 215;
pub const READY: u16 = 220;
pub const CLOSING: u16 = 221;
pub const AUTH_OK: u16 = 234;
pub const TOO_MANY_CONNECTIONS: u16 = 421;
pub const SERVICE_UNAVAILABLE: u16 = 431;
pub const SYNTAX_ERROR_IN_ARGS: u16 = 501;
pub const NOT_IMPLEMENTED: u16 = 502;
pub const BAD_SEQUENCE: u16 = 503;
pub const PARAMETER_NOT_IMPLEMENTED: u16 = 504;
pub const POLICY_DENIED: u16 = 534;

/// A reply sent on the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpResponse {
    code: u16,
    message: String,
}

impl FtpResponse {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Renders the reply in wire form. Messages spanning several lines use the
/// RFC 959 multi-line layout: `code-` on the first line, `code ` on the last.
impl fmt::Display for FtpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<&str> = self.message.lines().collect();
        match lines.as_slice() {
            [] => write!(f, "{} \r\n", self.code),
            [single] => write!(f, "{} {}\r\n", self.code, single),
            [first, middle @ .., last] => {
                write!(f, "{}-{}\r\n", self.code, first)?;
                for line in middle {
                    write!(f, "{}\r\n", line)?;
                }
                write!(f, "{} {}\r\n", self.code, last)
            }
        }
    }
}

/// Format an FTP response message
pub fn format_response(code: u16, message: &str) -> String {
    FtpResponse::new(code, message).to_string()
}
