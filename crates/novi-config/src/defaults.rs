use std::env;
use std::path::PathBuf;

use camino::Utf8PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Backend address handed to every plugin unless configured otherwise.
pub const DEFAULT_SERVER: &str = "unix:/tmp/novi.socket";

/// Content gateway address handed to every plugin.
pub const DEFAULT_GATEWAY: &str = "http://127.0.0.1:8080";

/// Directory scanned for plugin descriptors.
pub const DEFAULT_PLUGINS_PATH: &str = "plugins";

/// Root of the per-plugin data directories.
pub const DEFAULT_DATA_PATH: &str = "data";

/// Seconds the host waits for a worker to report readiness.
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 30;

/// Seconds between SIGTERM and SIGKILL when stopping a worker.
pub const DEFAULT_TERMINATION_GRACE_SECS: u64 = 10;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// TCP port used for the control socket on platforms without Unix sockets.
pub const DEFAULT_TCP_PORT: u16 = 7788;

/// Default backend address.
#[must_use]
pub fn default_server() -> String {
    DEFAULT_SERVER.to_owned()
}

/// Default gateway address.
#[must_use]
pub fn default_gateway() -> String {
    DEFAULT_GATEWAY.to_owned()
}

/// Default plugin directory.
#[must_use]
pub fn default_plugins_path() -> PathBuf {
    PathBuf::from(DEFAULT_PLUGINS_PATH)
}

/// Default data directory root.
#[must_use]
pub fn default_data_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_PATH)
}

/// Default readiness timeout in seconds.
#[must_use]
pub const fn default_readiness_timeout_secs() -> u64 {
    DEFAULT_READINESS_TIMEOUT_SECS
}

/// Default termination grace period in seconds.
#[must_use]
pub const fn default_termination_grace_secs() -> u64 {
    DEFAULT_TERMINATION_GRACE_SECS
}

/// Owned log filter value for serde defaults.
#[must_use]
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the default control socket for the host.
///
/// Prefers `$XDG_RUNTIME_DIR/novi`; falls back to a per-user directory
/// under the system temporary directory.
#[must_use]
pub fn default_control_socket() -> SocketEndpoint {
    default_control_socket_inner()
}

#[cfg(unix)]
fn default_control_socket_inner() -> SocketEndpoint {
    let mut base = runtime_base_directory().unwrap_or_else(fallback_base_directory);
    base.push("novi");
    SocketEndpoint::unix(base.join("novi-hostd.sock"))
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(unix)]
fn fallback_base_directory() -> Utf8PathBuf {
    let mut base = Utf8PathBuf::from_path_buf(env::temp_dir())
        .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
    base.push(user_namespace());
    base
}

#[cfg(unix)]
pub(crate) fn user_namespace() -> String {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn default_control_socket_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}
