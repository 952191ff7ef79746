//! Error handlers
//!
//! Maps errors to the FTP reply codes a protocol handler would send.

use crate::error::types::SecurityError;

/// Convert a security error to the FTP reply code for a failed `AUTH`.
pub fn security_error_to_ftp_code(err: &SecurityError) -> u16 {
    match err {
        SecurityError::NotConfigured(_) => 431,
        SecurityError::UnsupportedProtocol(_) => 504,
        _ => 534,
    }
}
