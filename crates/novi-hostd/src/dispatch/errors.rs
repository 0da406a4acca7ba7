//! Errors surfaced while parsing and serving control requests.

use std::io;

use thiserror::Error;

use novi_plugins::RestartError;

use crate::session::SessionError;

/// Errors surfaced during request parsing and dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed as JSON.
    #[error("malformed JSONL: {message}")]
    MalformedJsonl {
        /// Parser diagnostic.
        message: String,
    },

    /// Request fields are present but unusable.
    #[error("invalid request structure: {message}")]
    InvalidStructure {
        /// Description of the problem.
        message: String,
    },

    /// The method is not part of the control surface.
    #[error("unknown method: {method}")]
    UnknownMethod {
        /// Requested method.
        method: String,
    },

    /// Arguments were missing or malformed.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Description of the problem.
        message: String,
    },

    /// The session check failed.
    #[error("access denied: {0}")]
    Session(#[from] SessionError),

    /// The restart cascade failed or named an unknown plugin.
    #[error(transparent)]
    Restart(#[from] RestartError),

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge {
        /// Bytes read so far.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },

    /// IO error during read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialisation failed.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(#[from] serde_json::Error),

    /// The orchestrator is unusable after a panic elsewhere.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl DispatchError {
    /// Stable machine-readable code sent to clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MalformedJsonl { .. } => "malformed_request",
            Self::InvalidStructure { .. } => "invalid_request",
            Self::UnknownMethod { .. } => "unknown_method",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::Session(SessionError::PermissionDenied { .. }) => "permission_denied",
            Self::Session(_) => "unauthenticated",
            Self::Restart(RestartError::UnknownPlugin { .. }) => "unknown_plugin",
            Self::Restart(RestartError::DependencyDown { .. }) => "dependency_down",
            Self::Restart(RestartError::Lifecycle { .. }) => "restart_failed",
            Self::RequestTooLarge { .. } => "request_too_large",
            Self::Io(_) | Self::SerializeResponse(_) | Self::Internal { .. } => "internal",
        }
    }

    /// Exit status for this error: 1 for request errors, 2 for host
    /// failures.
    #[must_use]
    pub const fn exit_status(&self) -> i32 {
        match self {
            Self::Restart(RestartError::Lifecycle { .. })
            | Self::Session(SessionError::Unavailable)
            | Self::Io(_)
            | Self::SerializeResponse(_)
            | Self::Internal { .. } => 2,
            _ => 1,
        }
    }

    /// Creates a malformed JSONL error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJsonl {
            message: message.into(),
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
