//! Host process lifecycle: the run loop and termination signals.

mod errors;
mod launch;
mod shutdown;

pub use errors::HostError;
pub use launch::{process_spawner, run_host, run_host_with};
pub use shutdown::{
    ShutdownCause, ShutdownError, ShutdownSignal, ShutdownTrigger, SystemShutdownSignal,
};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
