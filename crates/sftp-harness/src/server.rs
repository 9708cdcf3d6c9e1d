//! Server lifecycle.
//!
//! `Server` owns the listener, the host key, and the served root. `bind`
//! prepares everything and reports the actual address (port 0 in the
//! configuration asks the OS for an ephemeral port), `start` spawns the
//! accept loop without blocking, and `stop` tears it down. Dropping the
//! server also stops it, so a fixture is released on every exit path.
//!
//! Each accepted connection gets its own SSH session and, once the client
//! requests the `sftp` subsystem, its own `SftpSession`; nothing is shared
//! between sessions.

use crate::hostkey;
use crate::session::SftpSession;
use crate::{Config, Error, Result};
use async_trait::async_trait;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId};
use russh_keys::key;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Local SFTP server for exercising file-transfer clients
pub struct Server {
    root_dir: PathBuf,
    host_key_path: PathBuf,
    local_addr: SocketAddr,
    ssh_config: Arc<russh::server::Config>,
    listener: Option<TcpListener>,
    shutdown: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
    /// Owned temp root, removed when the server is dropped
    _temp_root: Option<TempDir>,
}

impl Server {
    /// Prepare a server: resolve the root, load or generate the host key,
    /// and bind the listener.
    ///
    /// The bound address is available immediately through `local_addr`;
    /// nothing is accepted until `start` is called.
    pub async fn bind(config: Config) -> Result<Self> {
        config.validate()?;

        let (root_dir, temp_root) = match &config.root_dir {
            Some(dir) => (dir.clone(), None),
            None => {
                let tmp = TempDir::new()
                    .map_err(|e| Error::Config(format!("failed to create temp root: {e}")))?;
                (tmp.path().to_path_buf(), Some(tmp))
            }
        };

        let key_pair = hostkey::load_or_generate(&config.host_key_path).await?;

        let ssh_config = russh::server::Config {
            inactivity_timeout: Some(Duration::from_secs(config.timeout)),
            auth_rejection_time: Duration::from_secs(3),
            auth_rejection_time_initial: Some(Duration::from_secs(0)),
            keys: vec![key_pair],
            ..Default::default()
        };

        let listener = bind_listener(&config.bind_address, config.port, config.backlog)?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Connection(format!("failed to read bound address: {e}")))?;

        info!(
            address = %local_addr,
            root = ?root_dir,
            host_key = ?config.host_key_path,
            "server bound"
        );

        Ok(Self {
            root_dir,
            host_key_path: config.host_key_path,
            local_addr,
            ssh_config: Arc::new(ssh_config),
            listener: Some(listener),
            shutdown: CancellationToken::new(),
            accept_task: None,
            _temp_root: temp_root,
        })
    }

    /// The bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The bound host address
    pub fn host(&self) -> IpAddr {
        self.local_addr.ip()
    }

    /// The bound port
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// The directory served to clients
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// The host key file
    pub fn host_key_path(&self) -> &Path {
        &self.host_key_path
    }

    /// Begin accepting connections; returns immediately.
    pub fn start(&mut self) -> Result<()> {
        if self.accept_task.is_some() {
            info!("server is already running");
            return Ok(());
        }

        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::Connection("server was already stopped".to_string()))?;

        let ssh_config = self.ssh_config.clone();
        let root_dir = self.root_dir.clone();
        let shutdown = self.shutdown.clone();
        self.accept_task = Some(tokio::spawn(accept_loop(
            listener, ssh_config, root_dir, shutdown,
        )));

        info!("server started on {}", self.local_addr);
        Ok(())
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn stop(&mut self) {
        let Some(task) = self.accept_task.take() else {
            info!("server is not running");
            return;
        };

        self.shutdown.cancel();
        if let Err(e) = task.await {
            debug!("accept loop ended abnormally: {e}");
        }
        info!("server stopped");
    }
}

impl Drop for Server {
    /// Stop on drop, so scoped use releases the port on every exit path.
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    ssh_config: Arc<russh::server::Config>,
    root_dir: PathBuf,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("accept loop shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        info!("connection from {}", peer);
                        let config = ssh_config.clone();
                        let handler = SshSession::new(root_dir.clone());
                        tokio::spawn(async move {
                            match russh::server::run_stream(config, stream, handler).await {
                                Ok(session) => {
                                    if let Err(e) = session.await {
                                        debug!("session from {} ended: {}", peer, e);
                                    }
                                }
                                Err(e) => warn!("handshake with {} failed: {}", peer, e),
                            }
                        });
                    }
                    Err(e) => warn!("accept failed: {}", e),
                }
            }
        }
    }
}

/// Bind a listener the way the original fixture does: `SO_REUSEADDR` so a
/// restarted fixture can retake its port, with an explicit backlog.
fn bind_listener(bind_address: &str, port: u16, backlog: u32) -> Result<TcpListener> {
    use socket2::{Domain, Protocol, Socket, Type};

    let addr: SocketAddr = format!("{bind_address}:{port}")
        .parse()
        .map_err(|e| Error::Config(format!("invalid bind address: {e}")))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| Error::Connection(format!("failed to create socket: {e}")))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| Error::Connection(format!("failed to set SO_REUSEADDR: {e}")))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| Error::Connection(format!("failed to set nonblocking: {e}")))?;
    socket
        .bind(&addr.into())
        .map_err(|e| Error::Connection(format!("failed to bind {addr}: {e}")))?;
    socket
        .listen(backlog as i32)
        .map_err(|e| Error::Connection(format!("failed to listen: {e}")))?;

    TcpListener::from_std(socket.into())
        .map_err(|e| Error::Connection(format!("failed to register listener: {e}")))
}

/// Per-connection SSH handler.
///
/// Authentication accepts anything: this server exists to test clients, not
/// to gate access.
struct SshSession {
    root_dir: PathBuf,
    channel: Option<Channel<Msg>>,
}

impl SshSession {
    fn new(root_dir: PathBuf) -> Self {
        Self {
            root_dir,
            channel: None,
        }
    }
}

#[async_trait]
impl Handler for SshSession {
    type Error = Error;

    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth> {
        debug!("password authentication accepted for user {:?}", user);
        Ok(Auth::Accept)
    }

    async fn auth_publickey(&mut self, user: &str, _public_key: &key::PublicKey) -> Result<Auth> {
        debug!("public key authentication accepted for user {:?}", user);
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool> {
        debug!("session channel opened");
        self.channel = Some(channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<()> {
        if name != "sftp" {
            warn!("unsupported subsystem: {}", name);
            session.channel_failure(channel_id).await?;
            return Ok(());
        }

        let Some(channel) = self.channel.take() else {
            session.channel_failure(channel_id).await?;
            return Err(Error::Ssh(
                "subsystem requested before session channel".to_string(),
            ));
        };

        session.channel_success(channel_id).await?;

        let sftp = SftpSession::new(self.root_dir.clone());
        tokio::spawn(russh_sftp::server::run(channel.into_stream(), sftp));
        Ok(())
    }
}
