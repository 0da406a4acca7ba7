//! Runs a script entry as a child program.
//!
//! The script inherits the worker's data directory as its working directory
//! and receives its connection parameters through `NOVI_*` variables. Its
//! stdout is redirected to stderr so it cannot corrupt the handshake.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::info;

use crate::client::ClientContext;
use crate::error::WorkerError;

const RUNNER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::runner");

/// Plugin identifier.
pub const PLUGIN_ID_ENV: &str = "NOVI_PLUGIN_ID";
/// Backend address.
pub const SERVER_ENV: &str = "NOVI_SERVER";
/// Session token.
pub const IDENTITY_ENV: &str = "NOVI_IDENTITY";
/// Content gateway address.
pub const GATEWAY_ENV: &str = "NOVI_GATEWAY";
/// Configuration template; unset when the plugin ships none.
pub const CONFIG_TEMPLATE_ENV: &str = "NOVI_CONFIG_TEMPLATE";

/// Runs `path` to completion.
///
/// # Errors
///
/// Returns [`WorkerError::Script`] when the script cannot be started and
/// [`WorkerError::ScriptFailed`] when it exits unsuccessfully.
pub fn run_script(path: &Path, context: &ClientContext) -> Result<(), WorkerError> {
    let mut command = Command::new(path);
    command
        .current_dir(&context.data_dir)
        .env(PLUGIN_ID_ENV, &context.identifier)
        .env(SERVER_ENV, &context.server)
        .env(IDENTITY_ENV, context.identity.expose())
        .env(GATEWAY_ENV, &context.gateway)
        .stdin(Stdio::null())
        .stdout(Stdio::from(io::stderr()));
    match &context.config_template {
        Some(template) => command.env(CONFIG_TEMPLATE_ENV, template),
        None => command.env_remove(CONFIG_TEMPLATE_ENV),
    };

    info!(target: RUNNER_TARGET, script = %path.display(), "running script entry");
    let status = command.status().map_err(|source| WorkerError::Script {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(WorkerError::ScriptFailed {
            path: path.to_path_buf(),
            status,
        })
    }
}

#[cfg(all(test, unix))]
mod tests;
