//! Seam between the worker and the client library that talks to the backend.

use std::path::PathBuf;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;

use novi_plugins::{EntryConfig, SessionToken};

use crate::error::WorkerError;

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Connection parameters handed to the client library and to entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    /// Plugin identifier.
    pub identifier: String,
    /// Backend address.
    pub server: String,
    /// Session token of the plugin principal.
    pub identity: SessionToken,
    /// Content gateway address.
    pub gateway: String,
    /// Working data directory.
    pub data_dir: PathBuf,
    /// Configuration template, present only when the file exists.
    pub config_template: Option<PathBuf>,
}

impl ClientContext {
    /// Builds the context for `config`, resolving the template path now.
    #[must_use]
    pub fn from_entry_config(config: &EntryConfig) -> Self {
        Self {
            identifier: config.identifier.clone(),
            server: config.server.clone(),
            identity: config.identity.clone(),
            gateway: config.gateway.clone(),
            data_dir: config.data_dir.clone(),
            config_template: config.existing_config_template().map(PathBuf::from),
        }
    }
}

/// Client library lifecycle as seen by the worker.
#[cfg_attr(test, mockall::automock)]
pub trait ClientLibrary {
    /// Registers the plugin with the backend.
    fn initialize(&mut self, context: &ClientContext) -> Result<(), WorkerError>;

    /// Blocks serving the backend until the worker is told to stop.
    fn join(&mut self) -> Result<(), WorkerError>;
}

/// Client used when no backend binding is linked in: it records the context
/// and then idles until a termination signal arrives.
#[derive(Default)]
pub struct StandaloneClient {
    context: Option<ClientContext>,
    signals: Option<Signals>,
}

impl StandaloneClient {
    /// Creates an uninitialised client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context received by [`ClientLibrary::initialize`].
    #[must_use]
    pub const fn context(&self) -> Option<&ClientContext> {
        self.context.as_ref()
    }
}

impl ClientLibrary for StandaloneClient {
    fn initialize(&mut self, context: &ClientContext) -> Result<(), WorkerError> {
        // Registered before readiness so an early SIGTERM is not lost.
        let signals =
            Signals::new([SIGTERM, SIGINT, SIGHUP]).map_err(|error| WorkerError::Client {
                message: format!("failed to install signal handlers: {error}"),
            })?;
        info!(
            target: CLIENT_TARGET,
            plugin = %context.identifier,
            server = %context.server,
            template = ?context.config_template,
            "client initialised"
        );
        self.signals = Some(signals);
        self.context = Some(context.clone());
        Ok(())
    }

    fn join(&mut self) -> Result<(), WorkerError> {
        let Some(signals) = self.signals.as_mut() else {
            return Err(WorkerError::Client {
                message: "join called before initialize".into(),
            });
        };
        if let Some(signal) = signals.forever().next() {
            info!(target: CLIENT_TARGET, signal, "termination signal received");
        }
        Ok(())
    }
}
