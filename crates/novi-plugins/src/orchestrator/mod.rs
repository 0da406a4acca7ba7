//! The plugin orchestrator.
//!
//! [`Orchestrator::prepare`] turns discovered records into a validated graph,
//! a launch order and one [`PluginState`] per enabled plugin. Graph errors
//! are fatal and surface before anything else happens. Provisioning happens
//! afterwards, per plugin: a plugin whose principal cannot be provisioned is
//! excluded together with everything that depends on it.
//!
//! [`Orchestrator::launch`] then spawns the fleet in order, blocking on each
//! readiness handshake. The orchestrator owns the state table, the order and
//! the supervisor for the rest of the host's life; the control surface
//! reaches it through [`OrchestratorHandle`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use novi_config::LogFormat;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cascade;
use crate::discovery::PluginSource;
use crate::entry::EntryConfig;
use crate::error::{LaunchError, RestartError, SupervisorError};
use crate::graph::{DependencyGraph, LaunchOrder};
use crate::manifest::{PluginMetadata, PluginRecord};
use crate::overrides::{OverrideTable, PluginOverride};
use crate::provision::{IdentityProvisioner, provision_session};
use crate::supervisor::{Spawner, Supervisor};

const ORCHESTRATOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::orchestrator");

/// Host-wide values copied into every entry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Backend address.
    pub server: String,
    /// Content gateway address.
    pub gateway: String,
    /// Root of the per-plugin data directories.
    pub data_path: PathBuf,
    /// Log filter for workers.
    pub log_filter: String,
    /// Log format for workers.
    pub log_format: LogFormat,
}

impl LaunchSettings {
    /// Data directory of `identifier`.
    #[must_use]
    pub fn data_dir(&self, identifier: &str) -> PathBuf {
        self.data_path.join(identifier)
    }
}

/// Everything the orchestrator keeps per enabled plugin.
#[derive(Debug, Clone)]
pub struct PluginState {
    record: PluginRecord,
    settings: PluginOverride,
    entry: EntryConfig,
}

impl PluginState {
    /// The immutable record.
    #[must_use]
    pub const fn record(&self) -> &PluginRecord {
        &self.record
    }

    /// The deployment override in effect.
    #[must_use]
    pub const fn plugin_override(&self) -> &PluginOverride {
        &self.settings
    }

    /// The configuration handed to the worker.
    #[must_use]
    pub const fn entry_config(&self) -> &EntryConfig {
        &self.entry
    }
}

/// A plugin left out of the fleet during preparation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    /// Excluded plugin.
    pub identifier: String,
    /// Why it was excluded.
    pub reason: String,
}

/// A plugin whose worker failed to start during launch.
#[derive(Debug, Clone)]
pub struct LaunchFailure {
    /// Plugin identifier.
    pub identifier: String,
    /// Handshake or spawn failure.
    pub error: SupervisorError,
}

/// Outcome of [`Orchestrator::launch`].
#[derive(Debug, Clone, Default)]
pub struct LaunchReport {
    /// Plugins that signalled readiness, in launch order.
    pub started: Vec<String>,
    /// Plugins whose worker failed to start.
    pub failed: Vec<LaunchFailure>,
    /// Plugins not attempted because a dependency failed to start.
    pub skipped: Vec<String>,
}

impl LaunchReport {
    /// Whether every plugin started.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// One entry of `plugin.list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginStatus {
    /// Informational metadata.
    #[serde(flatten)]
    pub metadata: PluginMetadata,
    /// Whether the worker is running.
    pub alive: bool,
}

/// Owner of the plugin table, the launch order and the live workers.
pub struct Orchestrator<S> {
    states: BTreeMap<String, PluginState>,
    graph: DependencyGraph,
    order: LaunchOrder,
    excluded: Vec<Exclusion>,
    supervisor: Supervisor<S>,
}

impl<S: Spawner> Orchestrator<S> {
    /// Loads, validates and provisions the fleet without starting it.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError`] for duplicate identifiers, missing
    /// dependencies and cycles. No principal is provisioned and no directory
    /// is created when an error is returned.
    pub fn prepare<P>(
        source: &dyn PluginSource,
        overrides: &OverrideTable,
        provisioner: &P,
        settings: &LaunchSettings,
        supervisor: Supervisor<S>,
    ) -> Result<Self, LaunchError>
    where
        P: IdentityProvisioner + ?Sized,
    {
        let mut enabled = accept_records(source.discover(), overrides)?;
        let mut graph = DependencyGraph::build(enabled.values().map(|(record, _)| record))?;
        let mut order = graph.linearize()?;
        info!(
            target: ORCHESTRATOR_TARGET,
            plugins = order.len(),
            order = ?order.as_slice(),
            "dependency graph resolved"
        );

        let mut states = BTreeMap::new();
        let mut excluded = Vec::new();
        let mut dropped: BTreeSet<String> = BTreeSet::new();
        for identifier in order.iter() {
            if dropped.contains(identifier) {
                continue;
            }
            let Some((record, settings_override)) = enabled.remove(identifier) else {
                continue;
            };
            match build_state(record, settings_override, provisioner, settings) {
                Ok(state) => {
                    states.insert(identifier.to_owned(), state);
                }
                Err(reason) => {
                    error!(
                        target: ORCHESTRATOR_TARGET,
                        plugin = identifier,
                        reason = reason.as_str(),
                        "excluding plugin"
                    );
                    excluded.push(Exclusion {
                        identifier: identifier.to_owned(),
                        reason,
                    });
                    dropped.insert(identifier.to_owned());
                    for dependent in graph.transitive_dependents(identifier) {
                        if dropped.insert(dependent.clone()) {
                            warn!(
                                target: ORCHESTRATOR_TARGET,
                                plugin = dependent.as_str(),
                                dependency = identifier,
                                "excluding plugin whose dependency was excluded"
                            );
                            excluded.push(Exclusion {
                                reason: format!("dependency '{identifier}' was excluded"),
                                identifier: dependent,
                            });
                        }
                    }
                }
            }
        }

        let keep: BTreeSet<String> = states.keys().cloned().collect();
        graph.retain(&keep);
        order.retain(&keep);

        Ok(Self {
            states,
            graph,
            order,
            excluded,
            supervisor,
        })
    }

    /// Spawns every plugin in launch order, one readiness handshake at a
    /// time.
    ///
    /// A plugin that fails to start is reported and its transitive dependents
    /// are skipped; independent plugins still start.
    pub fn launch(&mut self) -> LaunchReport {
        let mut report = LaunchReport::default();
        let mut blocked: BTreeSet<String> = BTreeSet::new();
        for identifier in self.order.iter() {
            if blocked.contains(identifier) {
                warn!(
                    target: ORCHESTRATOR_TARGET,
                    plugin = identifier,
                    "skipping plugin whose dependency failed to start"
                );
                report.skipped.push(identifier.to_owned());
                continue;
            }
            let Some(state) = self.states.get(identifier) else {
                continue;
            };
            match self.supervisor.spawn(&state.entry) {
                Ok(_) => report.started.push(identifier.to_owned()),
                Err(failure) => {
                    error!(
                        target: ORCHESTRATOR_TARGET,
                        plugin = identifier,
                        error = %failure,
                        "plugin failed to start"
                    );
                    blocked.extend(self.graph.transitive_dependents(identifier));
                    report.failed.push(LaunchFailure {
                        identifier: identifier.to_owned(),
                        error: failure,
                    });
                }
            }
        }
        info!(
            target: ORCHESTRATOR_TARGET,
            started = report.started.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "launch finished"
        );
        report
    }

    /// Restarts `identifier` and every plugin that transitively depends on
    /// it. Returns the identifiers restarted, in order.
    ///
    /// # Errors
    ///
    /// [`RestartError::UnknownPlugin`] for identifiers that were not loaded;
    /// [`RestartError::DependencyDown`] when a plugin in the cascade depends
    /// on one outside it that is not running;
    /// [`RestartError::Lifecycle`] when a worker fails to stop or start.
    pub fn restart(&mut self, identifier: &str) -> Result<Vec<String>, RestartError> {
        let plan = cascade::plan_restart(&self.graph, &self.order, identifier)?;
        info!(
            target: ORCHESTRATOR_TARGET,
            plugin = identifier,
            plan = ?plan,
            "restarting plugin"
        );
        let configs: BTreeMap<String, EntryConfig> = plan
            .iter()
            .filter_map(|member| {
                self.states
                    .get(member)
                    .map(|state| (member.clone(), state.entry.clone()))
            })
            .collect();
        cascade::execute(
            &mut self.supervisor,
            &self.graph,
            &self.order,
            &configs,
            &plan,
        )
    }
}

impl<S> Orchestrator<S> {
    /// Metadata and liveness of every loaded plugin, in launch order.
    pub fn list(&mut self) -> Vec<PluginStatus> {
        let mut statuses = Vec::with_capacity(self.order.len());
        for identifier in self.order.iter() {
            let Some(state) = self.states.get(identifier) else {
                continue;
            };
            statuses.push(PluginStatus {
                metadata: state.record.metadata().clone(),
                alive: self.supervisor.is_alive(identifier),
            });
        }
        statuses
    }

    /// Terminates every worker, dependents first.
    pub fn shutdown(&mut self) {
        info!(
            target: ORCHESTRATOR_TARGET,
            live = self.supervisor.live_count(),
            "stopping plugins"
        );
        let reverse: Vec<String> = self.order.iter().rev().map(str::to_owned).collect();
        self.supervisor
            .terminate_all(reverse.iter().map(String::as_str));
    }

    /// Whether `identifier` has a running worker.
    pub fn is_alive(&mut self, identifier: &str) -> bool {
        self.supervisor.is_alive(identifier)
    }

    /// Number of running workers.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.supervisor.live_count()
    }

    /// The launch order, pruned to loaded plugins.
    #[must_use]
    pub const fn launch_order(&self) -> &LaunchOrder {
        &self.order
    }

    /// The dependency graph, pruned to loaded plugins.
    #[must_use]
    pub const fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// State of a loaded plugin.
    #[must_use]
    pub fn state(&self, identifier: &str) -> Option<&PluginState> {
        self.states.get(identifier)
    }

    /// Plugins excluded during preparation.
    #[must_use]
    pub fn excluded(&self) -> &[Exclusion] {
        &self.excluded
    }
}

/// Shared access to an orchestrator for request handlers.
///
/// The mutex serialises restarts and keeps the table single-writer.
pub struct OrchestratorHandle<S> {
    inner: Arc<Mutex<Orchestrator<S>>>,
}

impl<S> Clone for OrchestratorHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> OrchestratorHandle<S> {
    /// Wraps an orchestrator.
    #[must_use]
    pub fn new(orchestrator: Orchestrator<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(orchestrator)),
        }
    }

    /// Runs `operation` with exclusive access.
    ///
    /// Returns `None` when a previous holder panicked and poisoned the lock.
    pub fn with_orchestrator<R, F>(&self, operation: F) -> Option<R>
    where
        F: FnOnce(&mut Orchestrator<S>) -> R,
    {
        let mut guard = self.inner.lock().ok()?;
        Some(operation(&mut guard))
    }
}

/// Rejects duplicates and drops disabled plugins.
fn accept_records(
    records: Vec<PluginRecord>,
    overrides: &OverrideTable,
) -> Result<BTreeMap<String, (PluginRecord, PluginOverride)>, LaunchError> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut accepted = BTreeMap::new();
    for record in records {
        let identifier = record.identifier().to_owned();
        if !seen.insert(identifier.clone()) {
            return Err(LaunchError::DuplicateIdentifier { identifier });
        }
        let settings = overrides.get(&identifier);
        if settings.disabled {
            info!(
                target: ORCHESTRATOR_TARGET,
                plugin = identifier.as_str(),
                "plugin disabled by override"
            );
            continue;
        }
        accepted.insert(identifier, (record, settings));
    }
    Ok(accepted)
}

/// Provisions the plugin principal and derives its entry configuration.
fn build_state<P>(
    record: PluginRecord,
    settings_override: PluginOverride,
    provisioner: &P,
    settings: &LaunchSettings,
) -> Result<PluginState, String>
where
    P: IdentityProvisioner + ?Sized,
{
    let identifier = record.identifier().to_owned();
    let permissions = settings_override.effective_permissions(record.permissions());
    let identity = provision_session(
        provisioner,
        &identifier,
        &permissions,
        settings_override.elevated,
    )
    .map_err(|failure| failure.to_string())?;
    let data_dir = prepare_data_dir(&settings.data_dir(&identifier))?;
    let entry = EntryConfig {
        identifier,
        server: settings.server.clone(),
        identity,
        config_template: record.config_template_path(),
        gateway: settings.gateway.clone(),
        data_dir,
        entry: record.entry().clone(),
        log_filter: settings.log_filter.clone(),
        log_format: settings.log_format,
    };
    Ok(PluginState {
        record,
        settings: settings_override,
        entry,
    })
}

fn prepare_data_dir(path: &Path) -> Result<PathBuf, String> {
    fs::create_dir_all(path)
        .and_then(|()| std::path::absolute(path))
        .map_err(|failure| {
            format!(
                "failed to prepare data directory '{}': {failure}",
                path.display()
            )
        })
}
