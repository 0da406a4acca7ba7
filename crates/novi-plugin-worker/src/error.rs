//! Errors raised inside a plugin worker.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

use thiserror::Error;

use novi_plugins::ExecutionMode;

/// Failures that end a worker before or after its readiness signal.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The entry configuration was missing or malformed.
    #[error("invalid entry configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// The data directory could not be created or entered.
    #[error("failed to enter data directory '{path}': {source}")]
    DataDirectory {
        /// Data directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Logging could not be installed.
    #[error("failed to initialise logging: {message}")]
    Telemetry {
        /// Description of the failure.
        message: String,
    },

    /// The client library rejected initialisation or failed while joined.
    #[error("client library error: {message}")]
    Client {
        /// Description of the failure.
        message: String,
    },

    /// No entry is registered under the requested group and locator.
    #[error("no entry '{locator}' registered in group '{group}'")]
    UnknownEntry {
        /// Entry group.
        group: String,
        /// Entry locator.
        locator: String,
    },

    /// The entry was registered with a different execution mode.
    #[error("entry '{locator}' cannot run in {requested:?} mode")]
    ModeMismatch {
        /// Entry locator.
        locator: String,
        /// Mode requested by the descriptor.
        requested: ExecutionMode,
    },

    /// A named entry returned an error.
    #[error("entry '{locator}' failed: {message}")]
    Entry {
        /// Entry locator.
        locator: String,
        /// Error reported by the entry.
        message: String,
    },

    /// A script entry could not be started.
    #[error("failed to run script '{path}': {source}")]
    Script {
        /// Script path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A script entry exited unsuccessfully.
    #[error("script '{path}' exited with {status}")]
    ScriptFailed {
        /// Script path.
        path: PathBuf,
        /// Exit status.
        status: ExitStatus,
    },

    /// The readiness message could not be written.
    #[error("failed to signal readiness: {source}")]
    Ready {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}
