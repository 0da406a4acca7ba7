//! Host bootstrap: configuration, logging, session and the initial launch.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use novi_config::{Config, SocketPreparationError};
use novi_plugins::{
    DirectoryDiscovery, LaunchError, LaunchReport, LaunchSettings, ManifestError, Orchestrator,
    OrchestratorHandle, OverrideTable, SessionToken, Spawner, Supervisor,
};

use crate::health::HealthReporter;
use crate::session::{LocalSessionService, SessionError, SessionService};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the host configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration that was resolved earlier.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare control socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// No master key was configured.
    #[error("no master key configured; set NOVI_MASTER_KEY or master_key")]
    MissingMasterKey,
    /// The session service rejected the master key.
    #[error("failed to authenticate with the session service: {source}")]
    Authentication {
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
    /// The overrides file could not be read.
    #[error("failed to load plugin overrides: {source}")]
    Overrides {
        /// Underlying parse error.
        #[source]
        source: ManifestError,
    },
    /// The fleet failed validation.
    #[error("plugin launch aborted: {source}")]
    Launch {
        /// Underlying launch error.
        #[source]
        source: LaunchError,
    },
}

/// A bootstrapped host with its fleet launched.
pub struct Host<S> {
    config: Config,
    sessions: Arc<LocalSessionService>,
    master_session: SessionToken,
    orchestrator: OrchestratorHandle<S>,
    report: LaunchReport,
    telemetry: TelemetryHandle,
}

impl<S> Host<S> {
    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Session service shared with the control surface.
    #[must_use]
    pub fn sessions(&self) -> Arc<LocalSessionService> {
        Arc::clone(&self.sessions)
    }

    /// The host's own session.
    #[must_use]
    pub const fn master_session(&self) -> &SessionToken {
        &self.master_session
    }

    /// Handle to the orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> OrchestratorHandle<S> {
        self.orchestrator.clone()
    }

    /// Outcome of the initial launch.
    #[must_use]
    pub const fn launch_report(&self) -> &LaunchReport {
        &self.report
    }

    /// Telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }
}

/// Bootstraps the host and launches every plugin.
///
/// `make_spawner` receives the resolved configuration so the worker binary
/// and readiness bound can come from it.
///
/// # Errors
///
/// Returns a [`BootstrapError`] when configuration, logging, the master key
/// or the plugin graph is rejected. Nothing is spawned in that case.
pub fn bootstrap_with<S, F>(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
    make_spawner: F,
) -> Result<Host<S>, BootstrapError>
where
    S: Spawner,
    F: FnOnce(&Config) -> S,
{
    reporter.bootstrap_starting();
    match bootstrap_inner(loader, reporter, make_spawner) {
        Ok(host) => {
            reporter.bootstrap_succeeded(&host.config);
            Ok(host)
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn bootstrap_inner<S, F>(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
    make_spawner: F,
) -> Result<Host<S>, BootstrapError>
where
    S: Spawner,
    F: FnOnce(&Config) -> S,
{
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    config
        .control_socket()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;

    let master_key = config
        .master_key()
        .ok_or(BootstrapError::MissingMasterKey)?;
    let sessions = Arc::new(LocalSessionService::new(master_key));
    let master_session = sessions
        .authenticate(master_key)
        .map_err(|source| BootstrapError::Authentication { source })?;

    let overrides = match config.overrides_path() {
        Some(path) => {
            OverrideTable::load(path).map_err(|source| BootstrapError::Overrides { source })?
        }
        None => OverrideTable::new(),
    };
    let settings = LaunchSettings {
        server: config.server().to_owned(),
        gateway: config.gateway().to_owned(),
        data_path: config.data_path().to_path_buf(),
        log_filter: config.log_filter().to_owned(),
        log_format: config.log_format(),
    };
    let supervisor = Supervisor::new(make_spawner(&config), config.termination_grace());
    let source = DirectoryDiscovery::new(config.plugins_path());
    let mut orchestrator =
        Orchestrator::prepare(&source, &overrides, &*sessions, &settings, supervisor)
            .map_err(|source| BootstrapError::Launch { source })?;

    let report = orchestrator.launch();
    reporter.fleet_launched(&report);

    Ok(Host {
        config,
        sessions,
        master_session,
        orchestrator: OrchestratorHandle::new(orchestrator),
        report,
        telemetry,
    })
}
