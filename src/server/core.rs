use log::{debug, error, info, warn};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;
use crate::connection::{ConnectionManager, FtpConnection, LoggingObserver};
use crate::error::ServerError;
use crate::protocol::responses::TOO_MANY_CONNECTIONS;
use crate::protocol::{FtpResponse, ProtocolHandler};
use crate::server::context::ServerContext;
use crate::server::listener::Listener;

const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

pub struct Server {
    tcp_listener: TcpListener,
    listener: Arc<Listener>,
    context: Arc<ServerContext>,
}

impl Server {
    /// Binds the control port described by `config`.
    pub async fn bind(
        config: &ServerConfig,
        handler: Arc<dyn ProtocolHandler>,
    ) -> Result<Self, ServerError> {
        let control_socket = config.control_socket();
        let address: SocketAddr = control_socket
            .parse()
            .map_err(|_| ServerError::InvalidAddress(control_socket.clone()))?;

        let listener = Listener::from_config(config, address)?;
        let connections = Arc::new(ConnectionManager::new(
            config.max_clients,
            config.idle_timeout(),
        ));
        let context = ServerContext::new(handler, connections)
            .with_observer(Arc::new(LoggingObserver))
            .with_max_command_length(config.max_command_length);

        let tcp_listener = match TcpListener::bind(address).await {
            Ok(tcp_listener) => {
                info!("Server bound to {}", control_socket);
                tcp_listener
            }
            Err(source) => {
                error!("Failed to bind to {}: {}", control_socket, source);
                return Err(ServerError::Bind {
                    addr: control_socket,
                    source,
                });
            }
        };

        Ok(Self::from_parts(tcp_listener, Arc::new(listener), Arc::new(context)))
    }

    /// Assembles a server around an already bound socket.
    pub fn from_parts(
        tcp_listener: TcpListener,
        listener: Arc<Listener>,
        context: Arc<ServerContext>,
    ) -> Self {
        Self {
            tcp_listener,
            listener,
            context,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp_listener.local_addr()
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Accepts clients forever.
    pub async fn start(&self) {
        self.run_until(std::future::pending::<()>()).await;
    }

    /// Accepts clients until `shutdown` resolves, then asks every live
    /// session to close.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let connections = self.context.connections();
        info!(
            "Starting RAX FTPS server on {} (max {} clients, implicit TLS: {})",
            self.listener.address(),
            connections.max_connections(),
            self.listener.implicit_tls()
        );

        let sweeper = connections.spawn_idle_sweeper(IDLE_SWEEP_INTERVAL);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.tcp_listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_session(stream, addr),
                    Err(e) => error!("Error accepting connection: {}", e),
                },
                () = &mut shutdown => break,
            }
        }

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        let closing = connections.close_all().await;
        info!("Server shutting down, closing {} session(s)", closing);
    }

    /// Spawns a task for each client so the accept loop doesn't block.
    fn spawn_session(&self, stream: TcpStream, addr: SocketAddr) {
        let context = Arc::clone(&self.context);
        let listener = Arc::clone(&self.listener);

        tokio::spawn(async move {
            let connection = match FtpConnection::new(Arc::clone(&context), stream, listener) {
                Ok(connection) => connection,
                Err(e) => {
                    warn!("Failed to set up session for {}: {}", addr, e);
                    return;
                }
            };

            if let Err(e) = context
                .connections()
                .register(connection.handle().clone())
                .await
            {
                warn!("Refusing client {}: {}", addr, e);
                connection
                    .refuse(FtpResponse::new(
                        TOO_MANY_CONNECTIONS,
                        "Too many connections. Try again later.",
                    ))
                    .await;
                return;
            }

            let termination = connection.run().await;
            debug!("Session task for {} finished: {:?}", addr, termination);
        });
    }
}
