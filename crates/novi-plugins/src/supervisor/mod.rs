//! Worker process supervision.
//!
//! The [`Supervisor`] owns the identifier → live worker table. `spawn` blocks
//! until the worker has reported readiness, so by the time it returns the
//! plugin can serve requests from its dependents. `terminate` blocks until the
//! worker has been reaped. Dropping the supervisor terminates every worker it
//! still owns.

mod process;

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::entry::EntryConfig;
use crate::error::SupervisorError;

pub use self::process::{ProcessSpawner, WORKER_BINARY};

const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// A running worker owned by the supervisor.
pub trait WorkerHandle: Send {
    /// Operating-system process id.
    fn id(&self) -> u32;

    /// Whether the worker is still running.
    fn is_alive(&mut self) -> bool;

    /// Stops the worker and waits for it to exit.
    ///
    /// Implementations escalate to a forced kill once `grace` elapses.
    fn terminate(self: Box<Self>, grace: Duration) -> Result<(), SupervisorError>;
}

/// Starts workers and performs the readiness handshake.
pub trait Spawner {
    /// Launches a worker for `config` and blocks until it is ready.
    ///
    /// A worker that fails the handshake must not outlive the call.
    fn spawn(&self, config: &EntryConfig) -> Result<Box<dyn WorkerHandle>, SupervisorError>;
}

/// Owner of every live worker.
pub struct Supervisor<S> {
    spawner: S,
    grace: Duration,
    live: BTreeMap<String, Box<dyn WorkerHandle>>,
}

impl<S> Supervisor<S> {
    /// Creates a supervisor that stops workers with the given grace period.
    #[must_use]
    pub const fn new(spawner: S, grace: Duration) -> Self {
        Self {
            spawner,
            grace,
            live: BTreeMap::new(),
        }
    }

    /// The spawner used for new workers.
    pub const fn spawner(&self) -> &S {
        &self.spawner
    }

    /// Number of workers currently owned.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Whether `identifier` has a worker that is still running.
    ///
    /// A worker found dead is reaped and forgotten.
    pub fn is_alive(&mut self, identifier: &str) -> bool {
        let Some(handle) = self.live.get_mut(identifier) else {
            return false;
        };
        if handle.is_alive() {
            return true;
        }
        warn!(
            target: SUPERVISOR_TARGET,
            plugin = identifier,
            "worker exited unexpectedly"
        );
        if let Some(dead) = self.live.remove(identifier)
            && let Err(error) = dead.terminate(self.grace)
        {
            warn!(
                target: SUPERVISOR_TARGET,
                plugin = identifier,
                %error,
                "failed to reap exited worker"
            );
        }
        false
    }

    /// Stops the worker for `identifier`.
    ///
    /// Returns `Ok(false)` without side effects when no worker is live.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Terminate`] when the worker cannot be
    /// signalled or reaped. It is forgotten either way.
    pub fn terminate(&mut self, identifier: &str) -> Result<bool, SupervisorError> {
        let Some(handle) = self.live.remove(identifier) else {
            debug!(
                target: SUPERVISOR_TARGET,
                plugin = identifier,
                "terminate requested for plugin without a worker"
            );
            return Ok(false);
        };
        let pid = handle.id();
        handle.terminate(self.grace)?;
        info!(
            target: SUPERVISOR_TARGET,
            plugin = identifier,
            pid,
            "worker terminated"
        );
        Ok(true)
    }

    /// Stops every worker, first those named in `order`, then any others.
    ///
    /// Failures are logged; every worker is attempted.
    pub fn terminate_all<'a, I>(&mut self, order: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut ordered: Vec<String> = order.into_iter().map(str::to_owned).collect();
        ordered.extend(self.live.keys().rev().cloned());
        for identifier in ordered {
            if let Err(error) = self.terminate(&identifier) {
                warn!(
                    target: SUPERVISOR_TARGET,
                    plugin = identifier.as_str(),
                    %error,
                    "failed to terminate worker during shutdown"
                );
            }
        }
    }
}

impl<S: Spawner> Supervisor<S> {
    /// Starts a worker for `config` and waits for its readiness signal.
    ///
    /// Returns the worker's process id.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::AlreadyRunning`] when a worker for the plugin
    /// is live, or the spawner's error when the handshake fails.
    pub fn spawn(&mut self, config: &EntryConfig) -> Result<u32, SupervisorError> {
        let identifier = config.identifier.as_str();
        if self.live.contains_key(identifier) {
            return Err(SupervisorError::AlreadyRunning {
                identifier: identifier.to_owned(),
            });
        }
        debug!(
            target: SUPERVISOR_TARGET,
            plugin = identifier,
            entry = %config.entry.describe(),
            "spawning worker"
        );
        let handle = self.spawner.spawn(config)?;
        let pid = handle.id();
        self.live.insert(identifier.to_owned(), handle);
        info!(
            target: SUPERVISOR_TARGET,
            plugin = identifier,
            pid,
            "worker ready"
        );
        Ok(pid)
    }
}

impl<S> Drop for Supervisor<S> {
    fn drop(&mut self) {
        if self.live.is_empty() {
            return;
        }
        self.terminate_all(std::iter::empty());
    }
}
