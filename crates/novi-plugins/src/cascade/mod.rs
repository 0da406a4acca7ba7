//! Cascading restarts.
//!
//! Restarting a plugin also restarts everything built on top of it. The
//! cascade is planned from the stored graph and launch order and executed one
//! terminate/spawn pair at a time.
//!
//! Members are visited in reverse launch order, dependents before the plugin
//! they depend on. This means a dependent is respawned while its dependency
//! is still the old instance, which is then bounced underneath it.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, info, warn};

use crate::entry::EntryConfig;
use crate::error::RestartError;
use crate::graph::{DependencyGraph, LaunchOrder};
use crate::supervisor::{Spawner, Supervisor};

const CASCADE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cascade");

/// The target plugin plus every transitive dependent.
#[must_use]
pub fn restart_set(graph: &DependencyGraph, identifier: &str) -> BTreeSet<String> {
    let mut set: BTreeSet<String> =
        graph.transitive_dependents(identifier).into_iter().collect();
    set.insert(identifier.to_owned());
    set
}

/// Orders the restart set of `identifier` for execution.
///
/// # Errors
///
/// Returns [`RestartError::UnknownPlugin`] when `identifier` is not in the
/// graph.
pub fn plan_restart(
    graph: &DependencyGraph,
    order: &LaunchOrder,
    identifier: &str,
) -> Result<Vec<String>, RestartError> {
    if !graph.contains(identifier) {
        return Err(RestartError::UnknownPlugin {
            identifier: identifier.to_owned(),
        });
    }
    let members = restart_set(graph, identifier);
    Ok(order
        .iter()
        .rev()
        .filter(|candidate| members.contains(*candidate))
        .map(str::to_owned)
        .collect())
}

/// Finds the first dependency outside `plan` that has no running worker.
///
/// Returns the `(member, dependency)` pair, or `None` when every outside
/// dependency is alive.
fn dead_dependency<S>(
    supervisor: &mut Supervisor<S>,
    graph: &DependencyGraph,
    plan: &[String],
) -> Option<(String, String)> {
    let members: BTreeSet<&str> = plan.iter().map(String::as_str).collect();
    for member in plan.iter().rev() {
        let Some(dependencies) = graph.dependencies(member) else {
            continue;
        };
        for dependency in dependencies {
            if members.contains(dependency.as_str()) {
                continue;
            }
            if !supervisor.is_alive(dependency) {
                return Some((member.clone(), dependency.clone()));
            }
        }
    }
    None
}

/// Runs a planned cascade through the supervisor.
///
/// Each member is terminated and then respawned before the next is touched.
/// When a step fails, live transitive dependents of the failing plugin are
/// stopped so none keeps running against a dead dependency, and the error
/// reports what was restarted and stopped.
///
/// # Errors
///
/// [`RestartError::DependencyDown`] when a member depends on a plugin outside
/// the plan that is not running; no worker is touched in that case.
/// [`RestartError::UnknownPlugin`] when a member has no configuration.
/// [`RestartError::Lifecycle`] when a worker fails to stop or start.
pub fn execute<S: Spawner>(
    supervisor: &mut Supervisor<S>,
    graph: &DependencyGraph,
    order: &LaunchOrder,
    configs: &BTreeMap<String, EntryConfig>,
    plan: &[String],
) -> Result<Vec<String>, RestartError> {
    if let Some((plugin, dependency)) = dead_dependency(supervisor, graph, plan) {
        warn!(
            target: CASCADE_TARGET,
            plugin = plugin.as_str(),
            dependency = dependency.as_str(),
            "refusing restart while a dependency is down"
        );
        return Err(RestartError::DependencyDown { plugin, dependency });
    }
    let mut restarted = Vec::with_capacity(plan.len());
    for identifier in plan {
        let Some(config) = configs.get(identifier) else {
            return Err(RestartError::UnknownPlugin {
                identifier: identifier.clone(),
            });
        };
        let step = supervisor
            .terminate(identifier)
            .and_then(|_| supervisor.spawn(config));
        if let Err(source) = step {
            error!(
                target: CASCADE_TARGET,
                plugin = identifier.as_str(),
                error = %source,
                "restart step failed"
            );
            let stopped = stop_dependents(supervisor, graph, order, identifier);
            return Err(RestartError::Lifecycle {
                plugin: identifier.clone(),
                restarted,
                stopped,
                source,
            });
        }
        info!(
            target: CASCADE_TARGET,
            plugin = identifier.as_str(),
            "plugin restarted"
        );
        restarted.push(identifier.clone());
    }
    Ok(restarted)
}

/// Stops live transitive dependents of `identifier`, dependents first.
fn stop_dependents<S: Spawner>(
    supervisor: &mut Supervisor<S>,
    graph: &DependencyGraph,
    order: &LaunchOrder,
    identifier: &str,
) -> Vec<String> {
    let dependents: BTreeSet<String> =
        graph.transitive_dependents(identifier).into_iter().collect();
    let mut stopped = Vec::new();
    for dependent in order.iter().rev().filter(|id| dependents.contains(*id)) {
        match supervisor.terminate(dependent) {
            Ok(true) => stopped.push(dependent.to_owned()),
            Ok(false) => {}
            Err(failure) => warn!(
                target: CASCADE_TARGET,
                plugin = dependent,
                error = %failure,
                "failed to stop dependent of failed plugin"
            ),
        }
    }
    stopped
}
