//! Top-level host run loop.

use std::sync::Arc;

use tracing::{info, warn};

use novi_config::Config;
use novi_plugins::{ProcessSpawner, Spawner};

use crate::bootstrap::{ConfigLoader, StaticConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::dispatch::ControlConnectionHandler;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::transport::SocketListener;

use super::PROCESS_TARGET;
use super::errors::HostError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Runs the host with the production collaborators until a termination
/// signal arrives.
///
/// # Errors
///
/// See [`run_host_with`].
pub fn run_host() -> Result<(), HostError> {
    let shutdown = SystemShutdownSignal::install()?;
    let reporter: Arc<dyn HealthReporter> = Arc::new(StructuredHealthReporter::new());
    run_host_with(&SystemConfigLoader, &shutdown, &reporter, process_spawner)
}

/// Spawner for real worker processes, configured from `config`.
#[must_use]
pub fn process_spawner(config: &Config) -> ProcessSpawner {
    ProcessSpawner::new(
        ProcessSpawner::locate_worker(config.worker_binary()),
        config.readiness_timeout(),
    )
}

/// Runs the host with injected collaborators.
///
/// The control socket is bound before bootstrap, so a second host sharing
/// the socket path fails without spawning a worker. Shutdown stops the
/// listener before terminating the workers in reverse launch order.
///
/// # Errors
///
/// Returns a [`HostError`] when configuration, the control socket or
/// bootstrap fails, or when termination cannot be awaited. Workers started
/// before the failure are stopped first.
pub fn run_host_with<L, D, S, F>(
    loader: &L,
    shutdown: &D,
    reporter: &Arc<dyn HealthReporter>,
    make_spawner: F,
) -> Result<(), HostError>
where
    L: ConfigLoader,
    D: ShutdownSignal,
    S: Spawner + Send + 'static,
    F: FnOnce(&Config) -> S,
{
    let config = loader.load()?;
    let endpoint = config.control_socket().clone();
    endpoint.prepare_filesystem()?;
    let listener = SocketListener::bind(&endpoint)?;

    let host = bootstrap_with(&StaticConfigLoader::new(config), reporter, make_spawner)?;
    let handler = Arc::new(ControlConnectionHandler::new(
        host.orchestrator(),
        host.sessions(),
        Arc::clone(reporter),
    ));
    let served = match listener.start(handler) {
        Ok(listener_handle) => {
            reporter.serving(&endpoint);
            let cause = shutdown.wait();
            if let Ok(reason) = &cause {
                reporter.stopping(*reason);
            }
            listener_handle.shutdown();
            let joined = listener_handle.join();
            cause
                .map_err(HostError::from)
                .and_then(|_| joined.map_err(HostError::from))
        }
        Err(failure) => Err(HostError::from(failure)),
    };

    if host
        .orchestrator()
        .with_orchestrator(|fleet| fleet.shutdown())
        .is_none()
    {
        warn!(
            target: PROCESS_TARGET,
            "plugin table poisoned; workers are reaped when the host drops"
        );
    }
    info!(target: PROCESS_TARGET, "host stopped");
    served
}
