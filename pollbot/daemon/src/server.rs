//! Daemon Server Implementation
//!
//! This module provides the server loop for the poll daemon:
//! - Accepts connections on a Unix socket
//! - Spawns a handler task per connection
//! - Answers each framed `CommandRequest` with a `CommandResponse`
//! - Supports graceful shutdown
//!
//! ```text
//!                     DaemonServer
//!                          │
//!          ┌───────────────┼───────────────┐
//!          │               │               │
//!     Discord gateway  Admin CLI       Test client
//!       (conn-1)        (conn-2)        (conn-3)
//!          │               │               │
//!          └───────────────┴───────────────┘
//!                          │
//!                     PollService
//!              (shared registry + platform)
//! ```
//!
//! Requests on one connection are answered in order. Separate connections
//! run concurrently against the same `PollService`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use pollbot_core::transport::frame::{write_frame, FrameReader};
use pollbot_core::{CommandRequest, PollService};

/// How often the accept loop wakes up to check the shutdown flag
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Unique id of one client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state tracking
struct ConnectionState {
    connected_at: Instant,
    peer_uid: Option<u32>,
    abort_handle: tokio::task::AbortHandle,
}

/// Configuration for the daemon server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the Unix socket
    pub socket_path: PathBuf,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

/// The main daemon server
pub struct DaemonServer {
    config: ServerConfig,
    listener: UnixListener,
    service: PollService,
    connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
}

impl DaemonServer {
    /// Prepare the socket path and start listening
    ///
    /// The socket is created with owner-only permissions. A stale socket
    /// file at the same path is removed first.
    pub fn bind(config: ServerConfig, service: PollService) -> Result<Self> {
        prepare_socket(&config.socket_path)?;

        let listener = UnixListener::bind(&config.socket_path)
            .with_context(|| format!("Failed to bind to {:?}", config.socket_path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&config.socket_path, perms)
                .with_context(|| format!("Failed to restrict {:?}", config.socket_path))?;
        }

        info!(
            path = ?config.socket_path,
            max_connections = config.max_connections,
            store = service.registry().store_name(),
            "Listening for connections"
        );

        Ok(Self {
            config,
            listener,
            service,
            connection_states: Arc::new(DashMap::new()),
        })
    }

    /// Path of the bound socket
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Number of active connections
    pub fn connection_count(&self) -> usize {
        self.connection_states.len()
    }

    /// Accept connections until `shutdown` is set
    pub async fn run(self, shutdown: Arc<AtomicBool>) -> Result<()> {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, stopping accept loop");
                break;
            }

            // Accept with timeout to allow checking shutdown flag
            let accept_result =
                tokio::time::timeout(ACCEPT_POLL_INTERVAL, self.listener.accept()).await;

            let stream = match accept_result {
                Ok(Ok((stream, _addr))) => stream,
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                    continue;
                }
                Err(_) => continue,
            };

            if self.connection_states.len() >= self.config.max_connections {
                warn!(
                    max_connections = self.config.max_connections,
                    "Connection limit reached, rejecting new connection"
                );
                drop(stream);
                continue;
            }

            let peer_uid = get_peer_uid(&stream);
            if !peer_allowed(peer_uid) {
                drop(stream);
                continue;
            }

            let conn_id = ConnectionId::new();
            info!(
                conn_id = %conn_id,
                peer_uid = ?peer_uid,
                active_connections = self.connection_states.len() + 1,
                "New connection accepted"
            );

            // The handler waits until its state is recorded so it can always
            // remove it again
            let (registered_tx, registered_rx) = oneshot::channel::<()>();
            let service = self.service.clone();
            let connection_states = Arc::clone(&self.connection_states);
            let task_handle = tokio::spawn(
                async move {
                    let _ = registered_rx.await;
                    handle_connection(stream, service).await;
                    connection_states.remove(&conn_id);
                    info!(
                        active_connections = connection_states.len(),
                        "Connection handler finished"
                    );
                }
                .instrument(tracing::info_span!("connection", %conn_id)),
            );

            self.connection_states.insert(
                conn_id,
                ConnectionState {
                    connected_at: Instant::now(),
                    peer_uid,
                    abort_handle: task_handle.abort_handle(),
                },
            );
            let _ = registered_tx.send(());
        }

        self.shutdown()
    }

    /// Abort open connections and remove the socket file
    fn shutdown(self) -> Result<()> {
        info!("Initiating graceful shutdown");

        let conn_ids: Vec<ConnectionId> = self.connection_states.iter().map(|r| *r.key()).collect();
        for conn_id in conn_ids {
            if let Some((_, state)) = self.connection_states.remove(&conn_id) {
                info!(
                    conn_id = %conn_id,
                    peer_uid = ?state.peer_uid,
                    uptime_secs = state.connected_at.elapsed().as_secs(),
                    "Aborting connection"
                );
                state.abort_handle.abort();
            }
        }

        drop(self.listener);
        if self.config.socket_path.exists() {
            fs::remove_file(&self.config.socket_path).with_context(|| {
                format!("Failed to remove socket: {:?}", self.config.socket_path)
            })?;
            info!(path = ?self.config.socket_path, "Socket file removed");
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Create the socket directory and remove a stale socket
fn prepare_socket(socket_path: &Path) -> Result<()> {
    if let Some(parent) = socket_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {parent:?}"))?;
            info!(path = ?parent, "Created socket directory");
        }
    }

    if socket_path.exists() {
        warn!(path = ?socket_path, "Removing stale socket file");
        fs::remove_file(socket_path)
            .with_context(|| format!("Failed to remove stale socket: {socket_path:?}"))?;
    }

    Ok(())
}

/// Get peer credentials from a Unix socket
#[cfg(target_os = "linux")]
fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();
    // SAFETY: ucred is plain data; zeroed is a valid value
    let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
    #[allow(clippy::cast_possible_truncation)]
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

    // SAFETY: fd is a live socket owned by `stream`; cred and len outlive the call
    let result = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            std::ptr::addr_of_mut!(cred).cast::<libc::c_void>(),
            &mut len,
        )
    };

    if result == 0 {
        Some(cred.uid)
    } else {
        None
    }
}

#[cfg(not(target_os = "linux"))]
fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
    stream.peer_cred().ok().map(|cred| cred.uid())
}

/// Only the daemon's own user (or root) may connect
fn peer_allowed(peer_uid: Option<u32>) -> bool {
    // SAFETY: getuid has no preconditions and cannot fail
    let our_uid = unsafe { libc::getuid() };
    match peer_uid {
        Some(uid) if uid != our_uid && uid != 0 => {
            warn!(
                peer_uid = uid,
                our_uid = our_uid,
                "Rejecting connection from different user"
            );
            false
        }
        _ => true,
    }
}

/// Serve one client connection
///
/// Reads requests until the client disconnects or sends a frame that cannot
/// be decoded; a corrupt stream cannot be resynchronised, so it is closed.
pub async fn handle_connection<S>(stream: S, service: PollService)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    info!("Connection handler started");

    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = FrameReader::new(read_half);

    loop {
        let request: CommandRequest = match reader.next().await {
            Ok(Some(request)) => request,
            Ok(None) => {
                info!("Client disconnected (EOF)");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to decode request frame");
                break;
            }
        };

        debug!(request_id = %request.request_id, command = ?request.command, "Received request");
        let response = service.handle(request).await;

        if let Err(e) = write_frame(&mut write_half, &response).await {
            error!(error = %e, "Write error");
            break;
        }
    }
}
