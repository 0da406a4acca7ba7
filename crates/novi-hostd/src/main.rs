//! Entry point for the plugin host daemon.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match novi_hostd::run_host() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "host terminated with an error");
            writeln!(io::stderr().lock(), "novi-hostd: {error}").ok();
            ExitCode::FAILURE
        }
    }
}
