//! Worker process for Novi plugins.
//!
//! The host starts one worker per plugin and passes it an
//! [`EntryConfig`] through [`ENTRY_CONFIG_ENV`]. The worker then:
//!
//! 1. asks the kernel to terminate it when the host dies (Linux only),
//! 2. creates and enters the plugin's data directory,
//! 3. installs logging,
//! 4. initialises the client library,
//! 5. runs the plugin entry,
//! 6. reports readiness on stdout,
//! 7. joins the client library until told to stop.
//!
//! Any failure before step 6 ends the worker without a readiness line, which
//! the host reports as a failed start.

pub mod client;
pub mod error;
pub mod ready;
pub mod registry;
pub mod runner;
pub mod telemetry;

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::sync::Arc;

use tracing::info;

use novi_plugins::{ENTRY_CONFIG_ENV, EntryConfig, EntryDescriptor};

pub use self::client::{ClientContext, ClientLibrary, StandaloneClient};
pub use self::error::WorkerError;
pub use self::ready::ReadySignal;
pub use self::registry::{Entry, EntryRegistry, EntryResult, builtin_registry};

const WORKER_TARGET: &str = env!("CARGO_PKG_NAME");

/// Reads the entry configuration from the process environment.
///
/// # Errors
///
/// As [`parse_entry_config`].
pub fn load_entry_config() -> Result<EntryConfig, WorkerError> {
    parse_entry_config(std::env::var_os(ENTRY_CONFIG_ENV))
}

/// Decodes the raw value of [`ENTRY_CONFIG_ENV`].
pub fn parse_entry_config(raw: Option<OsString>) -> Result<EntryConfig, WorkerError> {
    let value = raw.ok_or_else(|| WorkerError::Config {
        message: format!("{ENTRY_CONFIG_ENV} is not set"),
    })?;
    let text = value.into_string().map_err(|_| WorkerError::Config {
        message: format!("{ENTRY_CONFIG_ENV} is not valid UTF-8"),
    })?;
    serde_json::from_str(&text).map_err(|error| WorkerError::Config {
        message: error.to_string(),
    })
}

/// Runs the full worker lifecycle for `config`.
///
/// # Errors
///
/// As [`prepare_process`] and [`serve`].
pub fn run_worker<C, W>(
    config: &EntryConfig,
    registry: &EntryRegistry,
    client: &mut C,
    ready: ReadySignal<W>,
) -> Result<(), WorkerError>
where
    C: ClientLibrary,
    W: Write,
{
    prepare_process(config)?;
    serve(config, registry, client, ready)
}

/// Binds the worker to its parent, enters the data directory and installs
/// logging.
///
/// # Errors
///
/// Returns [`WorkerError::DataDirectory`] when the data directory cannot be
/// entered and [`WorkerError::Telemetry`] when logging cannot be installed.
pub fn prepare_process(config: &EntryConfig) -> Result<(), WorkerError> {
    #[cfg(target_os = "linux")]
    bind_to_parent();

    let directory_error = |source| WorkerError::DataDirectory {
        path: config.data_dir.clone(),
        source: Arc::new(source),
    };
    fs::create_dir_all(&config.data_dir).map_err(directory_error)?;
    std::env::set_current_dir(&config.data_dir).map_err(directory_error)?;

    telemetry::initialise(&config.log_filter, config.log_format)
}

/// Initialises the client, runs the entry, signals readiness and joins.
///
/// Expects the current directory and logging to be prepared already.
///
/// # Errors
///
/// Returns a [`WorkerError`] when the client fails, the entry fails or
/// cannot be resolved, or readiness cannot be reported.
pub fn serve<C, W>(
    config: &EntryConfig,
    registry: &EntryRegistry,
    client: &mut C,
    ready: ReadySignal<W>,
) -> Result<(), WorkerError>
where
    C: ClientLibrary,
    W: Write,
{
    let context = ClientContext::from_entry_config(config);
    client.initialize(&context)?;

    info!(
        target: WORKER_TARGET,
        plugin = %config.identifier,
        entry = %config.entry.describe(),
        "running entry"
    );
    match &config.entry {
        EntryDescriptor::Named(named) => registry.run(named, &context)?,
        EntryDescriptor::Script { path } => runner::run_script(path, &context)?,
    }

    ready.set()?;
    info!(target: WORKER_TARGET, plugin = %config.identifier, "worker ready");
    client.join()
}

#[cfg(target_os = "linux")]
fn bind_to_parent() {
    use nix::sys::prctl;
    use nix::sys::signal::Signal;

    if let Err(error) = prctl::set_pdeathsig(Signal::SIGTERM) {
        tracing::warn!(
            target: WORKER_TARGET,
            %error,
            "failed to request termination on parent exit"
        );
    }
}

#[cfg(test)]
mod tests;
