#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
};
use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

use rax_ftps_server::connection::{
    ConnectionManager, ControlUpgrade, FtpConnection, SessionHandle, Termination,
};
use rax_ftps_server::error::SessionError;
use rax_ftps_server::protocol::{FtpRequest, FtpResponse, ProtocolHandler};
use rax_ftps_server::security::{ClientAuth, RustlsSslPolicy};
use rax_ftps_server::server::{Listener, ServerContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Opened,
    Request(String),
    Upgrade(Result<ControlUpgrade, String>),
    Closed,
}

pub type Events = Arc<Mutex<Vec<Event>>>;

/// Handler recording every callback. Replies `200 <VERB> ok` unless the
/// verb has a special meaning below.
pub struct RecordingHandler {
    events: Events,
}

impl RecordingHandler {
    pub fn new(events: Events) -> Self {
        Self { events }
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ProtocolHandler for RecordingHandler {
    async fn on_connection_opened(&self, connection: &mut FtpConnection) -> Result<(), SessionError> {
        self.push(Event::Opened);
        connection
            .writer()
            .write(&FtpResponse::new(220, "ready"))
            .await?;
        Ok(())
    }

    async fn on_request_received(
        &self,
        connection: &mut FtpConnection,
        request: &FtpRequest,
    ) -> Result<(), SessionError> {
        self.push(Event::Request(request.line().to_string()));

        match request.verb() {
            "AUTH" => {
                connection
                    .writer()
                    .write(&FtpResponse::new(234, "starting TLS"))
                    .await?;
                let protocol = request.argument().unwrap_or("TLS");
                match connection.secure_control_channel(protocol) {
                    Ok(outcome) => self.push(Event::Upgrade(Ok(outcome))),
                    Err(e) => {
                        self.push(Event::Upgrade(Err(e.to_string())));
                        connection
                            .writer()
                            .write(&FtpResponse::new(431, "TLS unavailable"))
                            .await?;
                    }
                }
            }
            "BURST" => {
                let count: usize = request.argument().unwrap_or("0").parse().unwrap_or(0);
                for i in 0..count {
                    connection
                        .writer()
                        .write(&FtpResponse::new(200, format!("line {i}")))
                        .await?;
                }
            }
            "WHOAMI" => {
                let certs = connection
                    .session()
                    .client_certificates()
                    .map(<[_]>::len)
                    .unwrap_or(0);
                let secure = connection.session().is_secure();
                connection
                    .writer()
                    .write(&FtpResponse::new(200, format!("certs={certs} secure={secure}")))
                    .await?;
            }
            "FAIL" => return Err(SessionError::handler("handler exploded")),
            "QUIT" => {
                connection
                    .writer()
                    .write(&FtpResponse::new(221, "bye"))
                    .await?;
                connection.close().await;
                connection.close().await;
            }
            verb => {
                connection
                    .writer()
                    .write(&FtpResponse::new(200, format!("{verb} ok")))
                    .await?;
            }
        }
        Ok(())
    }

    async fn on_connection_closed(&self, _connection: &mut FtpConnection) {
        self.push(Event::Closed);
    }
}

pub struct TestSession {
    pub client: TcpStream,
    pub events: Events,
    pub handle: SessionHandle,
    pub connections: Arc<ConnectionManager>,
    pub task: JoinHandle<Termination>,
}

pub fn requests(events: &Events) -> Vec<String> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            Event::Request(line) => Some(line.clone()),
            _ => None,
        })
        .collect()
}

pub fn closed_count(events: &Events) -> usize {
    events
        .lock()
        .unwrap()
        .iter()
        .filter(|event| **event == Event::Closed)
        .count()
}

pub fn upgrade_outcome(events: &Events) -> Option<Result<ControlUpgrade, String>> {
    events.lock().unwrap().iter().find_map(|event| match event {
        Event::Upgrade(outcome) => Some(outcome.clone()),
        _ => None,
    })
}

/// Accepts one client on a fresh port and runs a session for it.
pub async fn start_session(listener: Listener, max_command_length: usize) -> TestSession {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = tcp.local_addr().unwrap();
    let client = TcpStream::connect(addr).await.unwrap();
    let (stream, _) = tcp.accept().await.unwrap();

    let events = Events::default();
    let connections = Arc::new(ConnectionManager::new(8, None));
    let context = Arc::new(
        ServerContext::new(
            Arc::new(RecordingHandler::new(Arc::clone(&events))),
            Arc::clone(&connections),
        )
        .with_max_command_length(max_command_length),
    );

    let connection = FtpConnection::new(context, stream, Arc::new(listener)).unwrap();
    let handle = connection.handle().clone();
    connections.register(handle.clone()).await.unwrap();
    let task = tokio::spawn(connection.run());

    TestSession {
        client,
        events,
        handle,
        connections,
        task,
    }
}

pub fn plain_listener() -> Listener {
    Listener::new("test", "127.0.0.1:0".parse().unwrap())
}

/// Reads one reply line without its terminator.
pub async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    line.trim_end().to_string()
}

pub async fn send<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) {
    writer.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
    writer.flush().await.unwrap();
}

/// A throw-away CA with one server and one client certificate.
pub struct TestPki {
    pub ca: CertificateDer<'static>,
    pub server_chain: Vec<CertificateDer<'static>>,
    server_key: Vec<u8>,
    pub client_chain: Vec<CertificateDer<'static>>,
    client_key: Vec<u8>,
}

impl TestPki {
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "RAX test CA");
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let server_key = KeyPair::generate().unwrap();
        let mut server_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        server_params
            .distinguished_name
            .push(DnType::CommonName, "localhost");
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server = server_params.signed_by(&server_key, &ca, &ca_key).unwrap();

        let client_key = KeyPair::generate().unwrap();
        let mut client_params = CertificateParams::new(vec!["client.test".to_string()]).unwrap();
        client_params
            .distinguished_name
            .push(DnType::CommonName, "client");
        client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let client = client_params.signed_by(&client_key, &ca, &ca_key).unwrap();

        Self {
            ca: ca.der().clone(),
            server_chain: vec![server.der().clone()],
            server_key: server_key.serialize_der(),
            client_chain: vec![client.der().clone()],
            client_key: client_key.serialize_der(),
        }
    }

    pub fn roots(&self) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca.clone()).unwrap();
        roots
    }

    pub fn server_policy(&self) -> RustlsSslPolicy {
        RustlsSslPolicy::new(
            self.server_chain.clone(),
            PrivateKeyDer::Pkcs8(self.server_key.clone().into()),
        )
    }

    pub fn mutual_policy(&self, client_auth: ClientAuth) -> RustlsSslPolicy {
        self.server_policy()
            .with_client_auth(client_auth)
            .with_client_roots(self.roots())
    }

    pub fn connector(&self) -> TlsConnector {
        let config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(self.roots())
        .with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }

    pub fn connector_with_certificate(&self) -> TlsConnector {
        let config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(self.roots())
        .with_client_auth_cert(
            self.client_chain.clone(),
            PrivateKeyDer::Pkcs8(self.client_key.clone().into()),
        )
        .unwrap();
        TlsConnector::from(Arc::new(config))
    }
}

pub fn localhost() -> ServerName<'static> {
    ServerName::try_from("localhost").unwrap()
}
