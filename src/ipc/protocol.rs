//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::ShortcutEvent;
use crate::hotkey::{Action, Binding, ConflictWarning, KeyboardInfo, ReaderStatus, ServiceState};
use crate::session::SessionState;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from clients to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// List keyboard devices that can be pinned
    ListKeyboards,

    /// Bind an action to a chord; an empty chord unbinds it
    Rebind { action: String, chord: String },

    /// Ping to check connectivity
    Ping,

    /// Subscribe to event notifications
    Subscribe,
}

/// Responses from the daemon to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Available keyboards
    Keyboards { devices: Vec<KeyboardInfo> },

    /// Rebind applied
    Rebound {
        action: Action,
        /// Canonical chord, empty when unbound
        chord: String,
        conflicts: Vec<ConflictWarning>,
    },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Push notification from the daemon to subscribed clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Event { event: ShortcutEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Shortcut service lifecycle state
    pub service: ServiceState,

    /// Recording session state
    pub session: SessionState,

    /// Active bindings, in table order
    pub bindings: Vec<Binding>,

    /// Reader threads from the last start
    pub readers: Vec<ReaderStatus>,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            service: ServiceState::default(),
            session: SessionState::default(),
            bindings: Vec::new(),
            readers: Vec::new(),
            uptime_secs: 0,
        }
    }
}
