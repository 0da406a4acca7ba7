//! Worker binary started by `novi-hostd` for each plugin.

use std::io::{self, Write};
use std::process::ExitCode;

use novi_plugin_worker::{ReadySignal, StandaloneClient, builtin_registry};

fn main() -> ExitCode {
    let outcome = novi_plugin_worker::load_entry_config().and_then(|config| {
        let ready = ReadySignal::stdout(config.identifier.clone());
        novi_plugin_worker::run_worker(
            &config,
            &builtin_registry(),
            &mut StandaloneClient::new(),
            ready,
        )
    });
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(target: "novi_plugin_worker", %error, "worker failed");
            writeln!(io::stderr().lock(), "novi-plugin-worker: {error}").ok();
            ExitCode::FAILURE
        }
    }
}
