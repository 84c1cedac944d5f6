//! Compositor event stream
//!
//! The compositor pushes state changes over a dedicated socket as text
//! records, one per line:
//!
//! ```text
//! workspacev2>>3,3
//! openwindow>>5612a0c0,3,kitty,shell
//! closewindow>>5612a0c0
//! ```
//!
//! Each record is `name>>payload`. The payload is comma separated, and the
//! last field of most events (titles, workspace names) may itself contain
//! commas, so fields are split from the left with a fixed field count.
//!
//! ## Architecture
//!
//! ```text
//! +-------------+      +---------------+      +--------------+
//! | EventStream | ---> | Subscriptions | ---> | handlers     |
//! | (listener)  |      | (predicate)   |      | (enqueue)    |
//! +-------------+      +---------------+      +--------------+
//! ```
//!
//! The listener task owns the socket. Handlers run on the listener task and
//! must stay cheap: the reconciler's handlers only push into its queue.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::watch;
use tokio_stream::wrappers::SplitStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, trace, warn};

use super::error::{EventParseError, IpcError};

/// Record separator between event name and payload
const EVENT_SEPARATOR: &str = ">>";

/// A record split into its wire name and raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub name: String,
    pub payload: String,
}

impl RawEvent {
    /// Split a record on the first `>>`; surrounding whitespace is trimmed
    pub fn parse(line: &str) -> Result<Self, EventParseError> {
        let line = line.trim();
        let (name, payload) =
            line.split_once(EVENT_SEPARATOR)
                .ok_or_else(|| EventParseError::MissingSeparator {
                    line: line.to_string(),
                })?;

        Ok(Self {
            name: name.trim().to_string(),
            payload: payload.trim().to_string(),
        })
    }

    /// Split the payload into exactly `count` fields, the last one keeping any commas
    fn fields(&self, count: usize) -> Result<Vec<&str>, EventParseError> {
        let fields: Vec<&str> = self.payload.splitn(count, ',').collect();
        if fields.len() < count {
            return Err(EventParseError::MissingFields {
                event: self.name.clone(),
                expected: count,
                payload: self.payload.clone(),
            });
        }
        Ok(fields)
    }

    fn id_field(&self, field: &'static str, value: &str) -> Result<i64, EventParseError> {
        value
            .trim()
            .parse()
            .map_err(|_| EventParseError::InvalidField {
                event: self.name.clone(),
                field,
                value: value.to_string(),
            })
    }

    /// Split `<left>,<monitor>` where only the monitor is known to be comma free
    fn trailing_monitor(&self) -> Result<(String, String), EventParseError> {
        self.payload
            .rsplit_once(',')
            .map(|(left, monitor)| (left.to_string(), monitor.to_string()))
            .ok_or_else(|| EventParseError::MissingFields {
                event: self.name.clone(),
                expected: 2,
                payload: self.payload.clone(),
            })
    }
}

/// Typed compositor event
///
/// Workspace names are carried raw (`special:magic`, `name:web`); the
/// reconciler normalizes them. Window addresses are carried as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositorEvent {
    /// `workspace` / `workspacev2`: the focused workspace changed
    WorkspaceActivated { name: String },
    /// `createworkspace` / `createworkspacev2`
    WorkspaceCreated { id: Option<i64>, name: String },
    /// `destroyworkspace` / `destroyworkspacev2`
    WorkspaceDestroyed { id: Option<i64>, name: String },
    /// `renameworkspace`: `ID,NEWNAME`
    WorkspaceRenamed { id: i64, name: String },
    /// `moveworkspace` / `moveworkspacev2`: workspace now lives on `monitor`
    WorkspaceMoved { name: String, monitor: String },
    /// `activespecial`: a special workspace was shown or hidden (`name` empty) on `monitor`
    SpecialActivated { name: String, monitor: String },
    /// `focusedmon`: `MONITOR,WORKSPACE`
    MonitorFocused { monitor: String, workspace: String },
    /// `openwindow`: `ADDRESS,WORKSPACE,CLASS,TITLE`
    WindowOpened {
        address: String,
        workspace: String,
        class: String,
        title: String,
    },
    /// `closewindow`: `ADDRESS`
    WindowClosed { address: String },
    /// `movewindow` / `movewindowv2`: window moved to `workspace`
    WindowMoved { address: String, workspace: String },
    /// `windowtitle` / `windowtitlev2`; the v1 form carries no title
    WindowTitleChanged {
        address: String,
        title: Option<String>,
    },
    /// `urgent`: `ADDRESS`
    Urgent { address: String },
    /// `activewindowv2`: `ADDRESS`, or nothing when no window has focus
    WindowFocused { address: Option<String> },
    /// `configreloaded`
    ConfigReloaded,
    /// Anything the reconciler has no handler for
    Other { name: String, payload: String },
}

impl CompositorEvent {
    /// Parse one event record
    pub fn parse(line: &str) -> Result<Self, EventParseError> {
        Self::from_raw(&RawEvent::parse(line)?)
    }

    /// Build a typed event from an already split record
    pub fn from_raw(raw: &RawEvent) -> Result<Self, EventParseError> {
        let event = match raw.name.as_str() {
            "workspace" => Self::WorkspaceActivated {
                name: raw.payload.clone(),
            },
            "workspacev2" => {
                let fields = raw.fields(2)?;
                Self::WorkspaceActivated {
                    name: fields[1].to_string(),
                }
            }
            "createworkspace" => Self::WorkspaceCreated {
                id: None,
                name: raw.payload.clone(),
            },
            "createworkspacev2" => {
                let fields = raw.fields(2)?;
                Self::WorkspaceCreated {
                    id: Some(raw.id_field("workspace id", fields[0])?),
                    name: fields[1].to_string(),
                }
            }
            "destroyworkspace" => Self::WorkspaceDestroyed {
                id: None,
                name: raw.payload.clone(),
            },
            "destroyworkspacev2" => {
                let fields = raw.fields(2)?;
                Self::WorkspaceDestroyed {
                    id: Some(raw.id_field("workspace id", fields[0])?),
                    name: fields[1].to_string(),
                }
            }
            "renameworkspace" => {
                let fields = raw.fields(2)?;
                Self::WorkspaceRenamed {
                    id: raw.id_field("workspace id", fields[0])?,
                    name: fields[1].to_string(),
                }
            }
            "moveworkspace" => {
                let (name, monitor) = raw.trailing_monitor()?;
                Self::WorkspaceMoved { name, monitor }
            }
            "moveworkspacev2" => {
                // ID,NAME,MONITOR: drop the id, keep commas inside the name
                let fields = raw.fields(2)?;
                raw.id_field("workspace id", fields[0])?;
                let (name, monitor) =
                    fields[1]
                        .rsplit_once(',')
                        .ok_or_else(|| EventParseError::MissingFields {
                            event: raw.name.clone(),
                            expected: 3,
                            payload: raw.payload.clone(),
                        })?;
                Self::WorkspaceMoved {
                    name: name.to_string(),
                    monitor: monitor.to_string(),
                }
            }
            "activespecial" => {
                let (name, monitor) = raw.trailing_monitor()?;
                Self::SpecialActivated { name, monitor }
            }
            "focusedmon" => {
                let fields = raw.fields(2)?;
                Self::MonitorFocused {
                    monitor: fields[0].to_string(),
                    workspace: fields[1].to_string(),
                }
            }
            "openwindow" => {
                let fields = raw.fields(4)?;
                Self::WindowOpened {
                    address: fields[0].to_string(),
                    workspace: fields[1].to_string(),
                    class: fields[2].to_string(),
                    title: fields[3].to_string(),
                }
            }
            "closewindow" => Self::WindowClosed {
                address: raw.payload.clone(),
            },
            "movewindow" => {
                let fields = raw.fields(2)?;
                Self::WindowMoved {
                    address: fields[0].to_string(),
                    workspace: fields[1].to_string(),
                }
            }
            "movewindowv2" => {
                let fields = raw.fields(3)?;
                Self::WindowMoved {
                    address: fields[0].to_string(),
                    workspace: fields[2].to_string(),
                }
            }
            "windowtitle" => Self::WindowTitleChanged {
                address: raw.payload.clone(),
                title: None,
            },
            "windowtitlev2" => {
                let fields = raw.fields(2)?;
                Self::WindowTitleChanged {
                    address: fields[0].to_string(),
                    title: Some(fields[1].to_string()),
                }
            }
            "urgent" => Self::Urgent {
                address: raw.payload.clone(),
            },
            "activewindowv2" => {
                let address = raw.payload.trim_matches(',');
                Self::WindowFocused {
                    address: (!address.is_empty()).then(|| address.to_string()),
                }
            }
            "configreloaded" => Self::ConfigReloaded,
            _ => Self::Other {
                name: raw.name.clone(),
                payload: raw.payload.clone(),
            },
        };

        Ok(event)
    }
}

/// Identifier returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync>;
type Handler = Box<dyn Fn(&CompositorEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    predicate: Predicate,
    handler: Handler,
}

/// Registered event handlers, shared between the client and its listener task
#[derive(Default)]
pub struct Subscriptions {
    next_id: u64,
    entries: Vec<Subscription>,
}

impl std::fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriptions")
            .field("count", &self.entries.len())
            .finish()
    }
}

impl Subscriptions {
    pub fn add(&mut self, predicate: Predicate, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push(Subscription {
            id,
            predicate,
            handler,
        });
        id
    }

    /// Returns true if the subscription existed
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|s| s.id != id);
        self.entries.len() != before
    }

    /// Deliver one record to every subscription whose predicate accepts its name
    ///
    /// Returns the number of handlers invoked. A record that matches no
    /// predicate is never parsed beyond its name.
    pub fn dispatch(&self, raw: &RawEvent) -> usize {
        let interested: Vec<&Subscription> = self
            .entries
            .iter()
            .filter(|s| (s.predicate)(&raw.name))
            .collect();
        if interested.is_empty() {
            return 0;
        }

        let event = match CompositorEvent::from_raw(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed compositor event: {}", e);
                return 0;
            }
        };

        for subscription in &interested {
            (subscription.handler)(&event);
        }
        interested.len()
    }
}

/// Connection status of the event listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Line reader over the event socket
///
/// Records are read as raw bytes so a title cut mid-codepoint costs one
/// replacement character, not the connection.
pub struct EventStream {
    lines: SplitStream<BufReader<UnixStream>>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

impl EventStream {
    /// Connect to the event socket at `path`
    pub async fn connect(path: &Path) -> Result<Self, IpcError> {
        let socket = UnixStream::connect(path)
            .await
            .map_err(|e| IpcError::ConnectionFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self::from_stream(socket))
    }

    pub fn from_stream(socket: UnixStream) -> Self {
        Self {
            lines: SplitStream::new(BufReader::new(socket).split(b'\n')),
        }
    }

    /// Read the next record, skipping blank and malformed lines
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionClosed` on EOF.
    /// Returns `IpcError::ReceiveFailed` if reading from the socket fails.
    pub async fn next_record(&mut self) -> Result<RawEvent, IpcError> {
        loop {
            let bytes = match self.lines.next().await {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => return Err(IpcError::ReceiveFailed(e)),
                None => return Err(IpcError::ConnectionClosed),
            };

            let line = match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Event record is not valid UTF-8, decoding lossily");
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match RawEvent::parse(&line) {
                Ok(raw) => return Ok(raw),
                Err(e) => warn!("Skipping malformed event record: {}", e),
            }
        }
    }

}

/// Listener loop: read records until EOF and hand them to subscriptions
///
/// On EOF or a read error the state flips to `Disconnected` and the loop
/// returns. Reconnecting is the caller's decision.
pub(crate) async fn run_listener(
    mut stream: EventStream,
    subscriptions: Arc<Mutex<Subscriptions>>,
    state: Arc<watch::Sender<ConnectionState>>,
) {
    info!("Compositor event listener started");

    loop {
        let raw = match stream.next_record().await {
            Ok(raw) => raw,
            Err(IpcError::ConnectionClosed) => {
                warn!("Compositor event socket closed (EOF)");
                break;
            }
            Err(e) => {
                warn!("Compositor event stream error: {}", e);
                break;
            }
        };

        trace!(event = %raw.name, payload = %raw.payload, "Compositor event");

        let delivered = match subscriptions.lock() {
            Ok(subs) => subs.dispatch(&raw),
            Err(poisoned) => poisoned.into_inner().dispatch(&raw),
        };
        if delivered == 0 {
            trace!(event = %raw.name, "No subscriber for event");
        }
    }

    state.send_replace(ConnectionState::Disconnected);
    debug!("Compositor event listener stopped");
}
