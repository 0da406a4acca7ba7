//! Plugin lifecycle orchestration for the Novi plugin host.
//!
//! The crate turns a set of discovered plugin descriptors into a running
//! fleet of worker processes:
//!
//! 1. [`discovery`] finds plugins and [`manifest`] parses their descriptors.
//! 2. [`graph`] builds the dependency graph and linearizes it into a
//!    [`LaunchOrder`]. Missing dependencies, duplicates and cycles abort the
//!    launch before anything is started.
//! 3. [`provision`] obtains a principal and session token per plugin.
//! 4. [`supervisor`] spawns each worker in order and blocks on its readiness
//!    handshake ([`protocol`]).
//! 5. [`cascade`] restarts a plugin together with everything that depends on
//!    it.
//!
//! [`Orchestrator`] owns the whole lifecycle; request handlers reach it
//! through an [`OrchestratorHandle`].

pub mod cascade;
pub mod discovery;
pub mod entry;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod orchestrator;
pub mod overrides;
pub mod protocol;
pub mod provision;
pub mod supervisor;

#[cfg(test)]
mod tests;

pub use self::discovery::{DirectoryDiscovery, PluginSource};
pub use self::entry::{EntryConfig, EntryDescriptor, ExecutionMode, NamedEntry};
pub use self::error::{
    LaunchError, ManifestError, ProvisioningError, RestartError, SupervisorError,
};
pub use self::graph::{DependencyGraph, LaunchOrder};
pub use self::manifest::{PluginManifest, PluginMetadata, PluginRecord};
pub use self::orchestrator::{
    LaunchReport, LaunchSettings, Orchestrator, OrchestratorHandle, PluginStatus,
};
pub use self::overrides::{OverrideTable, PluginOverride};
pub use self::protocol::{ENTRY_CONFIG_ENV, WorkerMessage};
pub use self::provision::{IdentityProvisioner, Principal, SessionToken};
pub use self::supervisor::{ProcessSpawner, Spawner, Supervisor, WorkerHandle};
