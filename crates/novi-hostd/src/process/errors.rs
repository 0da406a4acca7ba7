//! Failures that end the host process.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use novi_config::SocketPreparationError;

use crate::bootstrap::BootstrapError;
use crate::transport::ListenerError;

use super::shutdown::ShutdownError;

/// Why [`run_host`](crate::run_host) returned an error.
#[derive(Debug, Error)]
pub enum HostError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {0}")]
    Config(#[from] Arc<OrthoError>),
    /// The control socket's directory could not be created.
    #[error("failed to prepare control socket directory: {0}")]
    SocketDirectory(#[from] SocketPreparationError),
    /// The control surface could not be served, including when another
    /// host already serves the same socket.
    #[error("control surface unavailable: {0}")]
    ControlSurface(#[from] ListenerError),
    /// The plugin graph was rejected or the master session refused.
    #[error("host bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),
    /// Termination signals could not be observed.
    #[error("failed to await termination: {0}")]
    Signal(#[from] ShutdownError),
}
