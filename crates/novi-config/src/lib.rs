//! Layered configuration shared by the Novi plugin host and its workers.
//!
//! Values resolve from built-in defaults, then an optional `novi-host.toml`
//! (located with `--config-path` or `NOVI_CONFIG_PATH`), then `NOVI_*`
//! environment variables, and finally command-line flags.

mod defaults;
mod logging;
mod socket;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_DATA_PATH, DEFAULT_GATEWAY, DEFAULT_LOG_FILTER, DEFAULT_PLUGINS_PATH,
    DEFAULT_READINESS_TIMEOUT_SECS, DEFAULT_SERVER, DEFAULT_TCP_PORT,
    DEFAULT_TERMINATION_GRACE_SECS, default_control_socket, default_data_path, default_gateway,
    default_log_filter, default_log_format, default_plugins_path, default_readiness_timeout_secs,
    default_server, default_termination_grace_secs,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "NOVI")]
pub struct Config {
    /// Backend address passed through to every plugin.
    #[ortho_config(default = default_server())]
    #[serde(default = "default_server")]
    pub server: String,
    /// Privileged credential the host authenticates with.
    #[serde(default)]
    pub master_key: Option<String>,
    /// Content gateway address passed through to every plugin.
    #[ortho_config(default = default_gateway())]
    #[serde(default = "default_gateway")]
    pub gateway: String,
    /// Directory scanned for plugin descriptors.
    #[ortho_config(default = default_plugins_path())]
    #[serde(default = "default_plugins_path")]
    pub plugins_path: PathBuf,
    /// Root of the per-plugin data directories.
    #[ortho_config(default = default_data_path())]
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    /// Optional YAML file of per-plugin overrides.
    #[serde(default)]
    pub overrides_path: Option<PathBuf>,
    /// Endpoint of the control surface.
    #[ortho_config(default = default_control_socket())]
    #[serde(default = "default_control_socket")]
    pub control_socket: SocketEndpoint,
    /// Worker executable; resolved next to the host binary when unset.
    #[serde(default)]
    pub worker_binary: Option<PathBuf>,
    /// Bound on the readiness handshake. Zero waits forever.
    #[ortho_config(default = default_readiness_timeout_secs())]
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,
    /// Grace period between SIGTERM and SIGKILL.
    #[ortho_config(default = default_termination_grace_secs())]
    #[serde(default = "default_termination_grace_secs")]
    pub termination_grace_secs: u64,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter())]
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Output format of the log subscriber.
    #[ortho_config(default = default_log_format())]
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: default_server(),
            master_key: None,
            gateway: default_gateway(),
            plugins_path: default_plugins_path(),
            data_path: default_data_path(),
            overrides_path: None,
            control_socket: default_control_socket(),
            worker_binary: None,
            readiness_timeout_secs: default_readiness_timeout_secs(),
            termination_grace_secs: default_termination_grace_secs(),
            log_filter: default_log_filter(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Backend address.
    #[must_use]
    pub fn server(&self) -> &str {
        self.server.as_str()
    }

    /// Privileged credential, when configured.
    #[must_use]
    pub fn master_key(&self) -> Option<&str> {
        self.master_key.as_deref()
    }

    /// Content gateway address.
    #[must_use]
    pub fn gateway(&self) -> &str {
        self.gateway.as_str()
    }

    /// Directory scanned for plugins.
    #[must_use]
    pub fn plugins_path(&self) -> &Path {
        self.plugins_path.as_path()
    }

    /// Root of the per-plugin data directories.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        self.data_path.as_path()
    }

    /// Overrides file, when configured.
    #[must_use]
    pub fn overrides_path(&self) -> Option<&Path> {
        self.overrides_path.as_deref()
    }

    /// Control surface endpoint.
    #[must_use]
    pub const fn control_socket(&self) -> &SocketEndpoint {
        &self.control_socket
    }

    /// Explicit worker executable, when configured.
    #[must_use]
    pub fn worker_binary(&self) -> Option<&Path> {
        self.worker_binary.as_deref()
    }

    /// Readiness bound; `None` means wait indefinitely.
    #[must_use]
    pub const fn readiness_timeout(&self) -> Option<Duration> {
        match self.readiness_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Grace period between SIGTERM and SIGKILL.
    #[must_use]
    pub const fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.termination_grace_secs)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
