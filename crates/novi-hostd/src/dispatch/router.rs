//! Method routing.

use serde_json::{Value, json};
use tracing::info;

use novi_plugins::{OrchestratorHandle, Spawner};

use crate::health::HealthReporter;

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::request::{ControlRequest, Method};

/// Runs an authorised request against the orchestrator.
pub(super) fn route<S: Spawner>(
    method: Method,
    request: &ControlRequest,
    orchestrator: &OrchestratorHandle<S>,
    reporter: &dyn HealthReporter,
) -> Result<Value, DispatchError> {
    match method {
        Method::List => {
            let plugins = orchestrator
                .with_orchestrator(|fleet| fleet.list())
                .ok_or_else(poisoned)?;
            Ok(json!({ "plugins": plugins }))
        }
        Method::Restart => {
            let plugin = request.plugin()?;
            info!(target: DISPATCH_TARGET, plugin, "restart requested");
            let outcome = orchestrator
                .with_orchestrator(|fleet| fleet.restart(plugin))
                .ok_or_else(poisoned)?;
            match outcome {
                Ok(restarted) => {
                    reporter.plugin_restarted(plugin, &restarted);
                    Ok(json!({ "restarted": restarted }))
                }
                Err(error) => {
                    reporter.restart_failed(&error);
                    Err(error.into())
                }
            }
        }
    }
}

fn poisoned() -> DispatchError {
    DispatchError::internal("orchestrator lock poisoned")
}
