//! Module `request`
//!
//! Lexical parsing of one control-channel line into a verb and its
//! argument text. Whether the verb exists or the argument is valid is left
//! to the protocol handler.

use std::fmt;

/// One command line received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpRequest {
    line: String,
    verb: String,
    argument: Option<String>,
}

impl FtpRequest {
    /// Parses a command line. Never fails: any text yields a request, with
    /// an empty verb for an empty line.
    pub fn parse(raw: &str) -> Self {
        let line = trim_line(raw);
        let (verb, argument) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, Some(rest.trim_start_matches(is_blank))),
            None => (line, None),
        };

        Self {
            line: line.to_string(),
            verb: verb.to_ascii_uppercase(),
            argument: argument
                .filter(|arg| !arg.is_empty())
                .map(str::to_string),
        }
    }

    /// The full trimmed line as received.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The upper-cased command verb.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// The raw argument text, if any.
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    pub fn has_argument(&self) -> bool {
        self.argument.is_some()
    }
}

/// Strips leading and trailing blanks: spaces and every ASCII control
/// character, NUL included.
pub fn trim_line(line: &str) -> &str {
    line.trim_matches(is_blank)
}

fn is_blank(c: char) -> bool {
    c <= ' '
}

impl fmt::Display for FtpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}
