//! Error types and handling for the call-core library
//!
//! Every failure that can surface from a call operation is a [`CallError`].
//! For the session error log the richer variants collapse into the five
//! [`ErrorKind`]s the UI routes on; the mapping lives in [`CallError::kind`].
//!
//! # Error Categories
//!
//! - **Media acquisition errors** - permission, missing or busy capture
//!   devices; they abort the current call attempt and are never retried
//!   automatically.
//! - **Connection errors** - transport or negotiation failures; after a call
//!   was connected these route through the retry orchestrator, which is the
//!   sole authority on retry-vs-give-up.
//! - **State errors** - an operation was invoked in a status that does not
//!   permit it; check the session status first.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::CallStatus;

/// Result type alias for call-core operations
pub type CallResult<T> = Result<T, CallError>;

/// Classification of a logged error, the single axis the UI routes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// The user denied access to capture devices
    PermissionsDenied,
    /// No matching capture device exists
    DeviceNotFound,
    /// A capture device exists but is held by another consumer
    DeviceBusy,
    /// Transport or negotiation failure
    Connection,
    /// Anything that does not classify more precisely
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::PermissionsDenied => "permissions-denied",
            ErrorKind::DeviceNotFound => "device-not-found",
            ErrorKind::DeviceBusy => "device-busy",
            ErrorKind::Connection => "connection",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Errors produced by call session operations
#[derive(Error, Debug, Clone)]
pub enum CallError {
    /// Media acquisition errors
    #[error("camera/microphone access denied: {reason}")]
    PermissionsDenied { reason: String },

    #[error("no camera/microphone found: {reason}")]
    DeviceNotFound { reason: String },

    #[error("camera/microphone already in use: {reason}")]
    DeviceBusy { reason: String },

    #[error("failed to access camera/microphone: {reason}")]
    MediaUnavailable { reason: String },

    /// Connection and signaling errors
    #[error("negotiation failed: {reason}")]
    NegotiationFailed { reason: String },

    #[error("transport failed: {reason}")]
    TransportFailed { reason: String },

    /// State errors
    #[error("invalid call state: expected {expected}, got {actual}")]
    InvalidCallState { expected: String, actual: CallStatus },

    /// The operation lost a race with call teardown; never user-visible
    #[error("operation cancelled by call teardown")]
    Cancelled,

    /// Builder errors
    #[error("missing required provider: {name}")]
    MissingProvider { name: &'static str },

    /// Generic errors
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CallError {
    /// Create a negotiation failure
    pub fn negotiation_failed(reason: impl Into<String>) -> Self {
        Self::NegotiationFailed { reason: reason.into() }
    }

    /// Create a transport failure
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        Self::TransportFailed { reason: reason.into() }
    }

    /// Create a state error
    pub fn invalid_state(expected: impl Into<String>, actual: CallStatus) -> Self {
        Self::InvalidCallState { expected: expected.into(), actual }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// The log classification for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::PermissionsDenied { .. } => ErrorKind::PermissionsDenied,
            CallError::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            CallError::DeviceBusy { .. } => ErrorKind::DeviceBusy,
            CallError::NegotiationFailed { .. } | CallError::TransportFailed { .. } => {
                ErrorKind::Connection
            }
            CallError::MediaUnavailable { .. }
            | CallError::InvalidCallState { .. }
            | CallError::Cancelled
            | CallError::MissingProvider { .. }
            | CallError::Internal { .. } => ErrorKind::Unknown,
        }
    }

    /// Check whether this error came out of media acquisition, which logs
    /// its own session entry before re-raising
    pub fn is_acquisition_error(&self) -> bool {
        matches!(
            self,
            CallError::PermissionsDenied { .. }
                | CallError::DeviceNotFound { .. }
                | CallError::DeviceBusy { .. }
                | CallError::MediaUnavailable { .. }
        )
    }
}
