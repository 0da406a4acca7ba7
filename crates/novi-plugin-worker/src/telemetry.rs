//! Worker logging, configured from the host's entry configuration.
//!
//! Workers log to stderr only: stdout carries the readiness handshake.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use novi_config::LogFormat;

use crate::error::WorkerError;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Installs the global subscriber on first use; later calls are no-ops.
///
/// # Errors
///
/// Returns [`WorkerError::Telemetry`] when the filter does not parse or
/// another global subscriber is already installed.
pub fn initialise(filter: &str, format: LogFormat) -> Result<(), WorkerError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(filter, format))
        .map(|_| ())
}

fn install_subscriber(filter: &str, format: LogFormat) -> Result<(), WorkerError> {
    let env_filter = EnvFilter::try_new(filter).map_err(|error| WorkerError::Telemetry {
        message: format!("invalid log filter: {error}"),
    })?;

    let builder = |directives: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(directives)
            .with_target(true)
            .with_level(true)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(builder(env_filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(env_filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(|error| WorkerError::Telemetry {
        message: error.to_string(),
    })
}
