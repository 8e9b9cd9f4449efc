// ── Channel error types ──
//
// Failures of the command/event channel. These never reach consumers of
// the store directly: the error log turns each one into an `AppError`
// record with a name and a fatal flag.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::{BackendCommand, BackendEvent};

const DEFAULT_BACKEND_ERROR_NAME: &str = "BackendError";

/// Error payload declared by the backend.
///
/// Arrives either as the rejection of a command or as the body of an
/// error event (`connection_error`, `proxy_error`, `deserialize_error`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{name}: {message}")]
pub struct BackendError {
    #[serde(default = "default_backend_error_name")]
    pub name: String,
    pub message: String,
    /// `true` when the backend considers the failure fatal.
    #[serde(default)]
    pub critical: bool,
}

impl BackendError {
    pub fn new(name: impl Into<String>, message: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            critical,
        }
    }
}

fn default_backend_error_name() -> String {
    DEFAULT_BACKEND_ERROR_NAME.to_owned()
}

/// Failure of a single command call or listener registration.
#[derive(Debug, Error)]
pub enum ChannelError {
    // ── Command errors ───────────────────────────────────────────────
    #[error("{command} rejected by backend: {source}")]
    Rejected {
        command: BackendCommand,
        source: BackendError,
    },

    #[error("backend has no handler for {0}")]
    UnknownCommand(BackendCommand),

    #[error("backend channel disconnected")]
    Disconnected,

    // ── Event errors ─────────────────────────────────────────────────
    #[error("cannot listen to {event}: {reason}")]
    ListenRefused { event: BackendEvent, reason: String },

    // ── Payload errors ───────────────────────────────────────────────
    #[error("cannot decode payload of {origin}: {source}")]
    Decode {
        origin: String,
        source: serde_json::Error,
    },
}

impl ChannelError {
    /// Name used for the error record built from this failure.
    pub fn record_name(&self) -> &str {
        match self {
            Self::Rejected { source, .. } => &source.name,
            Self::UnknownCommand(_) => "UnknownCommand",
            Self::Disconnected => "ConnectionError",
            Self::ListenRefused { .. } => "ListenError",
            Self::Decode { .. } => "DecodeError",
        }
    }

    /// The backend's own severity, when it declared one.
    pub fn backend_critical(&self) -> Option<bool> {
        match self {
            Self::Rejected { source, .. } => Some(source.critical),
            _ => None,
        }
    }
}
