//! Error types for compositor IPC operations

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when communicating with the compositor
#[derive(Debug, Error)]
pub enum IpcError {
    /// The HYPRLAND_INSTANCE_SIGNATURE environment variable is not set
    #[error("HYPRLAND_INSTANCE_SIGNATURE environment variable not set - is the compositor running?")]
    SignatureNotSet,

    /// The socket path does not exist
    #[error("Compositor socket not found at {path}")]
    SocketNotFound { path: PathBuf },

    /// Failed to connect to a compositor socket
    #[error("Failed to connect to compositor socket at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to send request to the compositor
    #[error("Failed to send request to compositor: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Failed to receive a reply or event from the compositor
    #[error("Failed to receive from compositor: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Failed to deserialize a JSON reply
    #[error("Failed to deserialize reply to `{request}`: {source}")]
    DeserializeFailed {
        request: String,
        #[source]
        source: serde_json::Error,
    },

    /// The compositor answered a command with something other than `ok`
    #[error("Compositor rejected `{request}`: {message}")]
    Rejected { request: String, message: String },

    /// A request did not complete within the configured timeout
    #[error("Request `{request}` timed out after {timeout:?}")]
    Timeout { request: String, timeout: Duration },

    /// Connection was closed unexpectedly
    #[error("Connection to compositor closed unexpectedly")]
    ConnectionClosed,

    /// Maximum retry attempts exceeded
    #[error("Failed to connect to compositor after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },
}

/// A single event record that could not be turned into a typed event
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    /// The line has no `>>` separator
    #[error("event record without `>>` separator: {line:?}")]
    MissingSeparator { line: String },

    /// The payload has fewer fields than the event requires
    #[error("event `{event}` expects {expected} field(s), got payload {payload:?}")]
    MissingFields {
        event: String,
        expected: usize,
        payload: String,
    },

    /// A numeric field did not parse
    #[error("event `{event}` has invalid {field}: {value:?}")]
    InvalidField {
        event: String,
        field: &'static str,
        value: String,
    },
}
