//! Minimal command handler for the RAX FTPS server.
//!
//! Greets clients and answers the session-level commands needed to
//! negotiate TLS on the control channel (RFC 4217). Everything else is
//! reported as not implemented; file system verbs belong to a fuller
//! handler built on the same trait.

use std::net::SocketAddr;

use async_trait::async_trait;
use log::{debug, warn};

use crate::connection::{ControlUpgrade, FtpConnection};
use crate::error::SessionError;
use crate::error::handlers::security_error_to_ftp_code;
use crate::protocol::ProtocolHandler;
use crate::protocol::request::FtpRequest;
use crate::protocol::responses::{self, FtpResponse};

const PROT_ATTRIBUTE: &str = "PROT";
const PBSZ_ATTRIBUTE: &str = "PBSZ";

#[derive(Debug, Clone)]
pub struct BasicProtocolHandler {
    greeting: String,
}

impl Default for BasicProtocolHandler {
    fn default() -> Self {
        Self {
            greeting: "Welcome to RAX FTPS Server".to_string(),
        }
    }
}

impl BasicProtocolHandler {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            greeting: greeting.into(),
        }
    }
}

#[async_trait]
impl ProtocolHandler for BasicProtocolHandler {
    async fn on_connection_opened(
        &self,
        connection: &mut FtpConnection,
    ) -> Result<(), SessionError> {
        let greeting = FtpResponse::new(responses::READY, self.greeting.as_str());
        connection.writer().write(&greeting).await?;
        Ok(())
    }

    async fn on_request_received(
        &self,
        connection: &mut FtpConnection,
        request: &FtpRequest,
    ) -> Result<(), SessionError> {
        match request.verb() {
            "AUTH" => handle_cmd_auth(connection, request).await,
            "PBSZ" => handle_cmd_pbsz(connection, request).await,
            "PROT" => handle_cmd_prot(connection, request).await,
            "PORT" => handle_cmd_port(connection, request).await,
            "FEAT" => reply(connection, responses::SYSTEM_STATUS, FEATURES).await,
            "SYST" => reply(connection, responses::SYSTEM_TYPE, "UNIX Type: L8").await,
            "NOOP" => reply(connection, responses::OK, "Command okay.").await,
            "QUIT" => handle_cmd_quit(connection).await,
            _ => {
                reply(
                    connection,
                    responses::NOT_IMPLEMENTED,
                    "Command not implemented.",
                )
                .await
            }
        }
    }

    async fn on_connection_closed(&self, connection: &mut FtpConnection) {
        connection.session_mut().data_connection_mut().close_data_connection();
        debug!(
            "[{}] Session for {} closed",
            connection.session().id(),
            connection.session().client_address()
        );
    }
}

const FEATURES: &str = "Extensions supported:\n AUTH TLS\n PBSZ\n PROT\nEnd";

async fn reply(
    connection: &mut FtpConnection,
    code: u16,
    message: &str,
) -> Result<(), SessionError> {
    connection
        .writer()
        .write(&FtpResponse::new(code, message))
        .await?;
    Ok(())
}

/// Handles AUTH: the 234 reply must go out in plain text before the
/// transport is swapped, since the client starts its handshake on it.
async fn handle_cmd_auth(
    connection: &mut FtpConnection,
    request: &FtpRequest,
) -> Result<(), SessionError> {
    let Some(mechanism) = request.argument().map(str::to_ascii_uppercase) else {
        return reply(connection, responses::SYNTAX_ERROR_IN_ARGS, "Missing AUTH mechanism.").await;
    };
    if !matches!(mechanism.as_str(), "TLS" | "TLS-C" | "SSL" | "TLS-P") {
        return reply(
            connection,
            responses::PARAMETER_NOT_IMPLEMENTED,
            "Unsupported AUTH mechanism.",
        )
        .await;
    }
    if connection.session().listener().ssl().is_none() {
        return reply(connection, responses::SERVICE_UNAVAILABLE, "TLS is not configured.").await;
    }
    if connection.session().is_secure() {
        return reply(connection, responses::BAD_SEQUENCE, "Control channel is already secure.")
            .await;
    }

    reply(connection, responses::AUTH_OK, "AUTH command okay; starting TLS connection.").await?;

    match connection.secure_control_channel(&mechanism) {
        Ok(ControlUpgrade::Secured) => {
            // SSL and TLS-P imply a protected data channel.
            if matches!(mechanism.as_str(), "SSL" | "TLS-P") {
                set_protection(connection, "P");
            }
            Ok(())
        }
        Ok(ControlUpgrade::AlreadySecure) => Ok(()),
        Err(SessionError::Security(e)) => {
            // 234 is already on the wire; the client is about to start a
            // handshake nobody will answer.
            warn!(
                "[{}] TLS upgrade failed after AUTH (reply {} withheld): {}",
                connection.session().id(),
                security_error_to_ftp_code(&e),
                e
            );
            Err(SessionError::Security(e))
        }
        Err(e) => Err(e),
    }
}

async fn handle_cmd_pbsz(
    connection: &mut FtpConnection,
    request: &FtpRequest,
) -> Result<(), SessionError> {
    if !connection.session().is_secure() {
        return reply(connection, responses::BAD_SEQUENCE, "PBSZ requires a secure control channel.")
            .await;
    }
    if request.argument().is_none() {
        return reply(connection, responses::SYNTAX_ERROR_IN_ARGS, "Missing buffer size.").await;
    }
    connection.session_mut().set_attribute(PBSZ_ATTRIBUTE, "0");
    reply(connection, responses::OK, "PBSZ=0").await
}

async fn handle_cmd_prot(
    connection: &mut FtpConnection,
    request: &FtpRequest,
) -> Result<(), SessionError> {
    if connection.session().attribute(PBSZ_ATTRIBUTE).is_none() {
        return reply(connection, responses::BAD_SEQUENCE, "PROT requires PBSZ first.").await;
    }
    match request.argument().map(str::to_ascii_uppercase).as_deref() {
        Some(level @ ("C" | "P")) => {
            set_protection(connection, level);
            reply(connection, responses::OK, &format!("Protection level set to {level}.")).await
        }
        Some("S" | "E") => {
            reply(
                connection,
                responses::PARAMETER_NOT_IMPLEMENTED,
                "Protection level not supported.",
            )
            .await
        }
        _ => reply(connection, responses::SYNTAX_ERROR_IN_ARGS, "Unknown protection level.").await,
    }
}

fn set_protection(connection: &mut FtpConnection, level: &str) {
    let session = connection.session_mut();
    session.set_attribute(PROT_ATTRIBUTE, level);
    session.data_connection_mut().set_secure(level == "P");
}

/// Handles the PORT command: records where the client waits for the data
/// connection. The address must be the client's own and the port must lie
/// outside the privileged range.
async fn handle_cmd_port(
    connection: &mut FtpConnection,
    request: &FtpRequest,
) -> Result<(), SessionError> {
    let Some(target) = request.argument().and_then(parse_port_argument) else {
        return reply(
            connection,
            responses::SYNTAX_ERROR_IN_ARGS,
            "Invalid address format. Use h1,h2,h3,h4,p1,p2.",
        )
        .await;
    };
    if target.ip() != connection.session().client_address().ip() {
        return reply(
            connection,
            responses::SYNTAX_ERROR_IN_ARGS,
            "IP address in PORT must match control connection.",
        )
        .await;
    }
    if target.port() < 1024 {
        return reply(
            connection,
            responses::SYNTAX_ERROR_IN_ARGS,
            "Port must be between 1024 and 65535.",
        )
        .await;
    }

    connection
        .session_mut()
        .data_connection_mut()
        .set_active_target(target);
    reply(connection, responses::OK, "PORT command successful.").await
}

/// Parses the RFC 959 `h1,h2,h3,h4,p1,p2` host-port form.
fn parse_port_argument(argument: &str) -> Option<SocketAddr> {
    let fields = argument
        .split(',')
        .map(|field| field.trim().parse::<u8>().ok())
        .collect::<Option<Vec<u8>>>()?;
    let [h1, h2, h3, h4, p1, p2] = fields[..] else {
        return None;
    };
    Some(SocketAddr::from((
        [h1, h2, h3, h4],
        u16::from_be_bytes([p1, p2]),
    )))
}

/// Handles the QUIT command: replies, then closes the session.
async fn handle_cmd_quit(connection: &mut FtpConnection) -> Result<(), SessionError> {
    reply(connection, responses::CLOSING, "Goodbye.").await?;
    connection.close().await;
    Ok(())
}
