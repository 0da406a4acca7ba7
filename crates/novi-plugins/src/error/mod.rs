//! Domain errors raised while loading, launching and restarting plugins.
//!
//! Errors are `thiserror` enums carrying structured context. I/O and JSON
//! sources are wrapped in `Arc` so lifecycle errors can be cloned into
//! launch reports and control-surface responses.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// A plugin descriptor could not be loaded. The plugin is skipped.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// The descriptor file could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The descriptor is not valid YAML or does not match the schema.
    #[error("invalid descriptor '{path}': {message}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// The descriptor has an empty identifier.
    #[error("descriptor '{path}' has an empty identifier")]
    MissingIdentifier {
        /// File that was parsed.
        path: PathBuf,
    },

    /// The plugin directory has neither an entry table nor a main script.
    #[error("plugin directory '{directory}' declares no entry and has no main script")]
    MissingEntry {
        /// Plugin source directory.
        directory: PathBuf,
    },
}

/// Fatal errors that abort a launch before any worker is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    /// Two discovered plugins share an identifier.
    #[error("duplicate plugin identifier '{identifier}'")]
    DuplicateIdentifier {
        /// The shared identifier.
        identifier: String,
    },

    /// A plugin depends on an identifier outside the accepted set.
    #[error("plugin '{plugin}' depends on missing plugin '{dependency}'")]
    MissingDependency {
        /// Plugin declaring the requirement.
        plugin: String,
        /// Identifier that could not be resolved.
        dependency: String,
    },

    /// The dependency graph contains at least one cycle.
    #[error("cyclic dependency among plugins: {}", .participants.join(", "))]
    CyclicDependency {
        /// Identifiers on, or between, the cycles.
        participants: Vec<String>,
    },
}

/// Worker lifecycle failures.
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    /// `spawn` was called for a plugin that already has a live worker.
    #[error("plugin '{identifier}' is already running")]
    AlreadyRunning {
        /// Plugin identifier.
        identifier: String,
    },

    /// The worker process could not be started.
    #[error("failed to start worker for '{identifier}': {source}")]
    Spawn {
        /// Plugin identifier.
        identifier: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The worker did not report readiness in time.
    #[error("plugin '{identifier}' did not become ready within {}s", .timeout.as_secs())]
    ReadinessTimeout {
        /// Plugin identifier.
        identifier: String,
        /// Configured bound.
        timeout: Duration,
    },

    /// The worker exited before reporting readiness.
    #[error(
        "plugin '{identifier}' exited before becoming ready ({})",
        describe_status(.status.as_ref())
    )]
    ExitedBeforeReady {
        /// Plugin identifier.
        identifier: String,
        /// Exit code, when the worker exited normally.
        status: Option<i32>,
    },

    /// The worker wrote something other than the readiness message.
    #[error("plugin '{identifier}' broke the readiness handshake: {message}")]
    Handshake {
        /// Plugin identifier.
        identifier: String,
        /// Description of the violation.
        message: String,
    },

    /// The worker could not be signalled or reaped.
    #[error("failed to terminate worker for '{identifier}': {source}")]
    Terminate {
        /// Plugin identifier.
        identifier: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The entry configuration could not be encoded for the worker.
    #[error("failed to encode entry configuration for '{identifier}': {source}")]
    Serialize {
        /// Plugin identifier.
        identifier: String,
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },
}

impl SupervisorError {
    /// Identifier of the plugin the error concerns.
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::AlreadyRunning { identifier }
            | Self::Spawn { identifier, .. }
            | Self::ReadinessTimeout { identifier, .. }
            | Self::ExitedBeforeReady { identifier, .. }
            | Self::Handshake { identifier, .. }
            | Self::Terminate { identifier, .. }
            | Self::Serialize { identifier, .. } => identifier,
        }
    }
}

fn describe_status(status: Option<&i32>) -> String {
    status.map_or_else(
        || String::from("killed by signal"),
        |code| format!("exit status {code}"),
    )
}

/// The identity backend could not provision a plugin principal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisioningError {
    /// The session service could not be reached.
    #[error("session service unreachable: {message}")]
    Unreachable {
        /// Transport diagnostic.
        message: String,
    },

    /// The session service refused the request.
    #[error("provisioning denied for '{identifier}': {message}")]
    Denied {
        /// Principal the request concerned.
        identifier: String,
        /// Reason given by the service.
        message: String,
    },
}

/// A cascading restart could not complete.
#[derive(Debug, Clone, Error)]
pub enum RestartError {
    /// The target is not a loaded plugin.
    #[error("unknown plugin '{identifier}'")]
    UnknownPlugin {
        /// Requested identifier.
        identifier: String,
    },

    /// A member of the cascade depends on a plugin outside it that is not
    /// running. Nothing was stopped or started.
    #[error("cannot restart '{plugin}': dependency '{dependency}' is not running")]
    DependencyDown {
        /// Cascade member with the dead dependency.
        plugin: String,
        /// The dependency that is not running.
        dependency: String,
    },

    /// A member of the cascade failed to stop or start.
    #[error("restart of '{plugin}' failed: {source}")]
    Lifecycle {
        /// Plugin whose lifecycle step failed.
        plugin: String,
        /// Plugins restarted before the failure, in order.
        restarted: Vec<String>,
        /// Live dependents stopped to keep the fleet consistent.
        stopped: Vec<String>,
        /// Underlying supervisor failure.
        #[source]
        source: SupervisorError,
    },
}
