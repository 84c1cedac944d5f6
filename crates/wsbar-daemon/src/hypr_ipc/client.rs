//! Compositor IPC client implementation
//!
//! This module provides the `CompositorClient`, the single shared service that
//! talks to the compositor. It owns two channels:
//!
//! - the command socket (`.socket.sock`): one short-lived connection per
//!   request, the compositor writes its reply and closes
//! - the event socket (`.socket2.sock`): one long-lived connection read by a
//!   background listener task that fans records out to subscriptions
//!
//! Requests are serialized: at most one command connection is open at a time.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::error::IpcError;
use super::events::{
    run_listener, CompositorEvent, ConnectionState, EventStream, SubscriptionId, Subscriptions,
};
use super::types::{
    parse_records, ClientReport, CompositorSnapshot, MonitorReport, WorkspaceReport,
    WorkspaceRuleReport,
};

/// Default number of connection retry attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Initial delay between retry attempts (100ms)
const INITIAL_RETRY_DELAY_MS: u64 = 100;

/// Maximum delay between retry attempts (1 second)
const MAX_RETRY_DELAY_MS: u64 = 1000;

/// Environment variable carrying the compositor instance signature
const INSTANCE_SIGNATURE_ENV: &str = "HYPRLAND_INSTANCE_SIGNATURE";

const RUNTIME_DIR_ENV: &str = "XDG_RUNTIME_DIR";

const COMMAND_SOCKET: &str = ".socket.sock";
const EVENT_SOCKET: &str = ".socket2.sock";

/// Prefix that makes the compositor answer a query with JSON
const JSON_PREFIX: &str = "j/";

/// Resolve the socket folder for `instance_sig` under an optional runtime dir
///
/// Uses `<runtime_dir>/hypr/<sig>` when `<runtime_dir>/hypr` exists and
/// falls back to `/tmp/hypr/<sig>` otherwise.
pub fn socket_folder_in(runtime_dir: Option<&Path>, instance_sig: &str) -> PathBuf {
    let base = match runtime_dir.map(|dir| dir.join("hypr")) {
        Some(hypr) if hypr.exists() => hypr,
        _ => {
            warn!("$XDG_RUNTIME_DIR/hypr does not exist, falling back to /tmp/hypr");
            PathBuf::from("/tmp").join("hypr")
        }
    };
    base.join(instance_sig)
}

/// Resolve the socket folder for `instance_sig` from `$XDG_RUNTIME_DIR`
pub fn socket_folder(instance_sig: &str) -> PathBuf {
    let runtime_dir = std::env::var_os(RUNTIME_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from);
    socket_folder_in(runtime_dir.as_deref(), instance_sig)
}

/// Locations of the two compositor sockets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketPaths {
    pub command: PathBuf,
    pub events: PathBuf,
}

impl SocketPaths {
    pub fn in_folder(folder: &Path) -> Self {
        Self {
            command: folder.join(COMMAND_SOCKET),
            events: folder.join(EVENT_SOCKET),
        }
    }

    /// Discover the socket paths from the environment
    ///
    /// # Errors
    ///
    /// Returns `IpcError::SignatureNotSet` if `$HYPRLAND_INSTANCE_SIGNATURE` is not set.
    pub fn discover() -> Result<Self, IpcError> {
        let signature = std::env::var(INSTANCE_SIGNATURE_ENV)
            .ok()
            .filter(|sig| !sig.is_empty())
            .ok_or(IpcError::SignatureNotSet)?;
        Ok(Self::in_folder(&socket_folder(&signature)))
    }
}

/// Client for communicating with the compositor
///
/// Construct one per process with `connect` and pass the returned `Arc` to
/// every consumer. Dropping the last reference stops the event listener.
///
/// # Example
///
/// ```ignore
/// let client = CompositorClient::connect(None).await?;
/// let snapshot = client.snapshot().await?;
/// client.subscribe(|name| name == "urgent", |event| println!("{:?}", event));
/// ```
pub struct CompositorClient {
    paths: SocketPaths,
    /// Per-request deadline; `None` waits forever
    timeout: Option<Duration>,
    /// Serializes command connections
    request_lock: AsyncMutex<()>,
    subscriptions: Arc<Mutex<Subscriptions>>,
    state: Arc<watch::Sender<ConnectionState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for CompositorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositorClient")
            .field("paths", &self.paths)
            .field("timeout", &self.timeout)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl CompositorClient {
    /// Connect using the sockets named by the environment
    ///
    /// # Errors
    ///
    /// Returns `IpcError::SignatureNotSet` if the instance signature is not set.
    /// Returns `IpcError::SocketNotFound` if the command socket does not exist.
    /// Returns `IpcError::ConnectionFailed` if the event socket refuses the connection.
    pub async fn connect(timeout: Option<Duration>) -> Result<Arc<Self>, IpcError> {
        let paths = SocketPaths::discover()?;
        Self::connect_to(paths, timeout).await
    }

    /// Connect to explicit socket paths and start the event listener
    ///
    /// Fails fast when either socket is unavailable.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::SocketNotFound` if the command socket does not exist.
    /// Returns `IpcError::ConnectionFailed` if the event socket refuses the connection.
    pub async fn connect_to(
        paths: SocketPaths,
        timeout: Option<Duration>,
    ) -> Result<Arc<Self>, IpcError> {
        if !paths.command.exists() {
            return Err(IpcError::SocketNotFound {
                path: paths.command.clone(),
            });
        }

        let stream = EventStream::connect(&paths.events).await?;
        info!(socket = %paths.events.display(), "Connected to compositor event socket");

        let subscriptions = Arc::new(Mutex::new(Subscriptions::default()));
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        let state = Arc::new(state_tx);

        let handle = tokio::spawn(run_listener(stream, subscriptions.clone(), state.clone()));

        Ok(Arc::new(Self {
            paths,
            timeout,
            request_lock: AsyncMutex::new(()),
            subscriptions,
            state,
            listener: Mutex::new(Some(handle)),
        }))
    }

    /// Attempt to connect with retry logic and exponential backoff
    ///
    /// # Backoff Strategy
    ///
    /// - Initial delay: 100ms
    /// - Each retry: delay *= 2
    /// - Maximum delay: 1 second (capped)
    ///
    /// # Errors
    ///
    /// Returns `IpcError::SignatureNotSet` immediately; it cannot change between attempts.
    /// Returns `IpcError::MaxRetriesExceeded` if all attempts fail.
    pub async fn connect_with_retry(
        max_retries: u32,
        timeout: Option<Duration>,
    ) -> Result<Arc<Self>, IpcError> {
        let mut attempt = 0;
        let mut delay_ms = INITIAL_RETRY_DELAY_MS;
        let mut last_error: Option<IpcError> = None;

        loop {
            attempt += 1;

            match Self::connect(timeout).await {
                Ok(client) => {
                    if attempt > 1 {
                        info!("Compositor connection established after {} attempt(s)", attempt);
                    }
                    return Ok(client);
                }
                Err(e) => {
                    if matches!(e, IpcError::SignatureNotSet) {
                        return Err(e);
                    }

                    last_error = Some(e);

                    if attempt > max_retries {
                        break;
                    }

                    warn!(
                        attempt = attempt,
                        max_retries = max_retries,
                        delay_ms = delay_ms,
                        "Compositor IPC connection failed, retrying..."
                    );

                    sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = (delay_ms * 2).min(MAX_RETRY_DELAY_MS);
                }
            }
        }

        warn!(
            attempts = attempt,
            last_error = ?last_error,
            "Failed to connect to compositor after all retry attempts"
        );

        Err(IpcError::MaxRetriesExceeded { attempts: attempt })
    }

    /// Sockets this client talks to
    pub fn paths(&self) -> &SocketPaths {
        &self.paths
    }

    /// Send one request on a fresh command connection and return the full reply
    ///
    /// Concurrent callers queue behind each other. When a timeout is
    /// configured it covers both the wait for the queue and the round trip.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::Timeout` if the configured deadline passes.
    /// Returns `IpcError::ConnectionClosed` if the compositor closes without replying.
    pub async fn request(&self, query: &str) -> Result<String, IpcError> {
        let exchange = async {
            let _guard = self.request_lock.lock().await;
            Self::round_trip(&self.paths.command, query).await
        };

        let reply = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| IpcError::Timeout {
                    request: query.to_string(),
                    timeout,
                })??,
            None => exchange.await?,
        };

        debug!(request = query, bytes = reply.len(), "Compositor request completed");
        Ok(reply)
    }

    async fn round_trip(path: &Path, query: &str) -> Result<String, IpcError> {
        let mut socket = UnixStream::connect(path)
            .await
            .map_err(|e| IpcError::ConnectionFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        socket
            .write_all(query.as_bytes())
            .await
            .map_err(IpcError::SendFailed)?;
        socket.flush().await.map_err(IpcError::SendFailed)?;

        let mut reply = Vec::new();
        socket
            .read_to_end(&mut reply)
            .await
            .map_err(IpcError::ReceiveFailed)?;

        if reply.is_empty() {
            return Err(IpcError::ConnectionClosed);
        }

        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    /// Send a JSON query (`workspaces` becomes `j/workspaces`) and decode the reply
    ///
    /// # Errors
    ///
    /// Returns any error from `request`.
    /// Returns `IpcError::DeserializeFailed` if the reply does not decode as `T`.
    pub async fn request_json<T: DeserializeOwned>(&self, query: &str) -> Result<T, IpcError> {
        let request = format!("{JSON_PREFIX}{query}");
        let reply = self.request(&request).await?;
        serde_json::from_str(&reply).map_err(|source| IpcError::DeserializeFailed { request, source })
    }

    async fn request_records<T: DeserializeOwned>(&self, query: &str) -> Result<Vec<T>, IpcError> {
        let value: Value = self.request_json(query).await?;
        parse_records(query, value)
    }

    /// Run a command that the compositor acknowledges with `ok`
    ///
    /// # Errors
    ///
    /// Returns any error from `request`.
    /// Returns `IpcError::Rejected` carrying the reply when it is not `ok`.
    pub async fn execute(&self, command: &str) -> Result<(), IpcError> {
        let reply = self.request(command).await?;
        let reply = reply.trim();
        if reply == "ok" {
            Ok(())
        } else {
            Err(IpcError::Rejected {
                request: command.to_string(),
                message: reply.to_string(),
            })
        }
    }

    /// Every workspace the compositor knows, on all monitors
    ///
    /// Records that do not decode are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns any error from `request_json`, or `IpcError::DeserializeFailed`
    /// when the reply is not an array.
    pub async fn workspaces(&self) -> Result<Vec<WorkspaceReport>, IpcError> {
        self.request_records("workspaces").await
    }

    /// Connected monitors with their active and special workspaces
    ///
    /// # Errors
    ///
    /// Same as `workspaces`.
    pub async fn monitors(&self) -> Result<Vec<MonitorReport>, IpcError> {
        self.request_records("monitors").await
    }

    /// Mapped windows with their workspace and focus history
    ///
    /// # Errors
    ///
    /// Same as `workspaces`.
    pub async fn clients(&self) -> Result<Vec<ClientReport>, IpcError> {
        self.request_records("clients").await
    }

    /// Workspace rules; older compositors do not know this query
    ///
    /// # Errors
    ///
    /// Same as `workspaces`.
    pub async fn workspace_rules(&self) -> Result<Vec<WorkspaceRuleReport>, IpcError> {
        self.request_records("workspacerules").await
    }

    /// Query everything a reconciliation tick needs
    ///
    /// A failing `workspacerules` query is logged and treated as empty.
    ///
    /// # Errors
    ///
    /// Returns the first error from the workspace, monitor or client query.
    pub async fn snapshot(&self) -> Result<CompositorSnapshot, IpcError> {
        let workspaces = self.workspaces().await?;
        let monitors = self.monitors().await?;
        let clients = self.clients().await?;
        let rules = match self.workspace_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!("Failed to query workspace rules, assuming none: {}", e);
                Vec::new()
            }
        };

        Ok(CompositorSnapshot {
            workspaces,
            monitors,
            clients,
            rules,
        })
    }

    /// Register a handler for every event whose name satisfies `predicate`
    ///
    /// Handlers run on the listener task, in registration order, and must
    /// not block. Keep the returned id to `unsubscribe` later.
    pub fn subscribe<P, H>(&self, predicate: P, handler: H) -> SubscriptionId
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
        H: Fn(&CompositorEvent) + Send + Sync + 'static,
    {
        let mut subs = match self.subscriptions.lock() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        };
        subs.add(Box::new(predicate), Box::new(handler))
    }

    /// Drop a handler registered with `subscribe`
    ///
    /// Returns `false` if `id` was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = match self.subscriptions.lock() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        };
        subs.remove(id)
    }

    /// Watch the event listener's connection state
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Whether the event listener is still reading
    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    /// Stop the event listener and wait for it to finish
    ///
    /// The connection state becomes `Disconnected`. Requests keep working,
    /// since each one opens its own command connection.
    pub async fn shutdown(&self) {
        let handle = match self.listener.lock() {
            Ok(mut listener) => listener.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(handle) = handle {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Compositor event listener ended abnormally: {}", e);
                }
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for CompositorClient {
    fn drop(&mut self) {
        let handle = match self.listener.get_mut() {
            Ok(listener) => listener.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}
