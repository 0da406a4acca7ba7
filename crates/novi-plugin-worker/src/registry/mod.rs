//! Named entries a worker can run, keyed by group and locator.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use tracing::{debug, info};

use novi_plugins::entry::DEFAULT_ENTRY_GROUP;
use novi_plugins::{ExecutionMode, NamedEntry};

use crate::client::ClientContext;
use crate::error::WorkerError;

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Outcome of running an entry; the error text is reported to the host log.
pub type EntryResult = Result<(), String>;

/// Synchronous entry callable.
pub type BlockingEntry = fn(&ClientContext) -> EntryResult;

/// Entry returning a future that the worker drives to completion.
pub type AwaitedEntry = fn(ClientContext) -> BoxFuture<'static, EntryResult>;

/// A registered callable.
#[derive(Debug, Clone, Copy)]
pub enum Entry {
    /// Called directly.
    Blocking(BlockingEntry),
    /// Called and awaited.
    Awaited(AwaitedEntry),
}

/// Entry lookup table.
#[derive(Debug, Default)]
pub struct EntryRegistry {
    entries: BTreeMap<(String, String), Entry>,
}

impl EntryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` under `group` and `locator`, replacing any previous
    /// registration.
    #[must_use]
    pub fn with_entry(
        mut self,
        group: impl Into<String>,
        locator: impl Into<String>,
        entry: Entry,
    ) -> Self {
        self.entries.insert((group.into(), locator.into()), entry);
        self
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, group: &str, locator: &str) -> Option<Entry> {
        self.entries
            .get(&(group.to_owned(), locator.to_owned()))
            .copied()
    }

    /// Resolves `named` and runs it according to its execution mode.
    ///
    /// [`ExecutionMode::None`] only checks that the entry exists.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::UnknownEntry`] for unregistered entries,
    /// [`WorkerError::ModeMismatch`] when the registered entry cannot run in
    /// the requested mode and [`WorkerError::Entry`] when it fails.
    pub fn run(&self, named: &NamedEntry, context: &ClientContext) -> Result<(), WorkerError> {
        let entry = self
            .get(named.group(), named.locator())
            .ok_or_else(|| WorkerError::UnknownEntry {
                group: named.group().to_owned(),
                locator: named.locator().to_owned(),
            })?;
        let outcome = match (named.mode(), entry) {
            (ExecutionMode::None, _) => {
                debug!(target: REGISTRY_TARGET, locator = named.locator(), "entry resolved");
                Ok(())
            }
            (ExecutionMode::Blocking, Entry::Blocking(call)) => call(context),
            (ExecutionMode::Awaited, Entry::Awaited(call)) => {
                futures::executor::block_on(call(context.clone()))
            }
            (requested, _) => {
                return Err(WorkerError::ModeMismatch {
                    locator: named.locator().to_owned(),
                    requested,
                });
            }
        };
        outcome.map_err(|message| WorkerError::Entry {
            locator: named.locator().to_owned(),
            message,
        })
    }
}

/// Registry holding the entries shipped with the worker binary.
#[must_use]
pub fn builtin_registry() -> EntryRegistry {
    EntryRegistry::new()
        .with_entry(DEFAULT_ENTRY_GROUP, "idle", Entry::Blocking(idle))
        .with_entry(DEFAULT_ENTRY_GROUP, "idle-async", Entry::Awaited(idle_async))
}

#[expect(clippy::unnecessary_wraps, reason = "matches the BlockingEntry signature")]
fn idle(context: &ClientContext) -> EntryResult {
    info!(target: REGISTRY_TARGET, plugin = %context.identifier, "idle entry ran");
    Ok(())
}

fn idle_async(context: ClientContext) -> BoxFuture<'static, EntryResult> {
    Box::pin(async move {
        info!(target: REGISTRY_TARGET, plugin = %context.identifier, "idle entry awaited");
        Ok(())
    })
}
