//! The plugin host daemon.
//!
//! The host discovers plugin descriptors, validates their dependency graph
//! and starts one worker process per plugin in dependency order. Each plugin
//! runs as its own principal: before spawning a worker the host provisions
//! the principal with exactly the permissions its descriptor and deployment
//! overrides grant, and hands the worker a session token for it.
//!
//! Startup runs in a fixed sequence:
//!
//! 1. load configuration with [`ortho_config`] layering;
//! 2. bind the control socket, which fails while another host serves it;
//! 3. install the `tracing` subscriber;
//! 4. authenticate with the master key;
//! 5. launch the fleet, waiting for each worker's readiness handshake;
//! 6. serve the control surface until a termination signal arrives.
//!
//! Shutdown stops the listener first and then terminates workers in reverse
//! launch order, so dependents never outlive what they depend on.
//!
//! The control surface speaks JSONL over the configured socket and offers
//! `plugin.list` and `plugin.restart`; see [`dispatch`] for the protocol.

mod bootstrap;
pub mod dispatch;
mod health;
mod process;
pub mod session;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Host, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    HostError, ShutdownCause, ShutdownError, ShutdownSignal, ShutdownTrigger,
    SystemShutdownSignal, process_spawner, run_host, run_host_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
