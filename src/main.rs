//! RAX FTPS Server - Entry Point
//!
//! FTP control-channel server with explicit (`AUTH TLS`) and implicit TLS.

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};

use rax_ftps_server::Server;
use rax_ftps_server::config::ServerConfig;
use rax_ftps_server::protocol::BasicProtocolHandler;
use rax_ftps_server::utils::logging::setup_logging;

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging();

    info!("Launching FTP server...");

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::bind(&config, Arc::new(BasicProtocolHandler::default())).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    ExitCode::SUCCESS
}
