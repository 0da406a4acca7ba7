//! Structured health reporting for host lifecycle events.

use std::sync::Arc;

use novi_config::{Config, SocketEndpoint};
use novi_plugins::{LaunchReport, RestartError};

use crate::bootstrap::BootstrapError;
use crate::process::ShutdownCause;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer notified of host lifecycle events.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after the fleet has been launched.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked with the outcome of the initial launch.
    fn fleet_launched(&self, report: &LaunchReport);

    /// Invoked after a cascading restart completes.
    fn plugin_restarted(&self, identifier: &str, restarted: &[String]);

    /// Invoked when a cascading restart fails.
    fn restart_failed(&self, error: &RestartError);

    /// Invoked once the control surface accepts requests.
    fn serving(&self, endpoint: &SocketEndpoint);

    /// Invoked when the host starts stopping its fleet.
    fn stopping(&self, cause: ShutdownCause);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn fleet_launched(&self, report: &LaunchReport) {
        (**self).fleet_launched(report);
    }

    fn plugin_restarted(&self, identifier: &str, restarted: &[String]) {
        (**self).plugin_restarted(identifier, restarted);
    }

    fn restart_failed(&self, error: &RestartError) {
        (**self).restart_failed(error);
    }

    fn serving(&self, endpoint: &SocketEndpoint) {
        (**self).serving(endpoint);
    }

    fn stopping(&self, cause: ShutdownCause) {
        (**self).stopping(cause);
    }
}

/// Reporter that records lifecycle events with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting host bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.control_socket(),
            plugins_path = %config.plugins_path().display(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "host bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "host bootstrap failed"
        );
    }

    fn fleet_launched(&self, report: &LaunchReport) {
        let failed: Vec<&str> = report
            .failed
            .iter()
            .map(|failure| failure.identifier.as_str())
            .collect();
        if report.is_complete() {
            tracing::info!(
                target: HEALTH_TARGET,
                event = "fleet_launched",
                started = ?report.started,
                "all plugins started"
            );
        } else {
            tracing::warn!(
                target: HEALTH_TARGET,
                event = "fleet_launched",
                started = ?report.started,
                failed = ?failed,
                skipped = ?report.skipped,
                "some plugins did not start"
            );
        }
    }

    fn plugin_restarted(&self, identifier: &str, restarted: &[String]) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "plugin_restarted",
            plugin = identifier,
            restarted = ?restarted,
            "cascading restart completed"
        );
    }

    fn restart_failed(&self, error: &RestartError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "restart_failed",
            error = %error,
            "cascading restart failed"
        );
    }

    fn serving(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "serving",
            endpoint = %endpoint,
            pid = std::process::id(),
            "host ready for control requests"
        );
    }

    fn stopping(&self, cause: ShutdownCause) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "stopping",
            cause = %cause,
            "host stopping"
        );
    }
}
