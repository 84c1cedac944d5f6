//! Compositor IPC for Hyprland-style compositors
//!
//! ## Architecture
//!
//! - `CompositorClient`: shared service for requests and event subscriptions
//! - `CompositorEvent`: typed view of one `name>>payload` event record
//! - `CompositorSnapshot`: workspaces, monitors, clients and rules at one instant
//! - `IpcError`: error types for IPC operations
//!
//! ## Protocol
//!
//! The compositor exposes two Unix sockets under
//! `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/`. Requests are plain
//! text written to `.socket.sock`; a `j/` prefix asks for a JSON reply. Events
//! stream from `.socket2.sock` as newline separated records.

mod client;
mod error;
mod events;
mod types;

pub use client::{socket_folder, socket_folder_in, CompositorClient, SocketPaths, DEFAULT_MAX_RETRIES};
pub use error::{EventParseError, IpcError};
pub use events::{CompositorEvent, ConnectionState, EventStream, RawEvent, SubscriptionId, Subscriptions};
pub use types::{
    parse_records, ClientReport, CompositorSnapshot, MonitorReport, WorkspaceRef, WorkspaceReport,
    WorkspaceRuleReport,
};
