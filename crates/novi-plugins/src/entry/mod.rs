//! Entry descriptors and the per-worker entry configuration.
//!
//! A plugin starts either from a named entry compiled into the worker binary
//! or from a standalone script. The host derives an [`EntryConfig`] for each
//! plugin and hands it to the worker process as JSON.

use std::path::{Path, PathBuf};

use novi_config::LogFormat;
use serde::{Deserialize, Serialize};

use crate::provision::SessionToken;

/// Entry group used when a named entry does not declare one.
pub const DEFAULT_ENTRY_GROUP: &str = "novi.plugins";

/// How a named entry is executed once resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Resolve the entry without calling it.
    None,
    /// Call the entry and wait for it to return.
    #[default]
    Blocking,
    /// Call the entry and drive the returned future to completion.
    Awaited,
}

/// A callable registered in the worker's entry registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntry {
    name: String,
    locator: String,
    #[serde(default = "default_group")]
    group: String,
    #[serde(default)]
    mode: ExecutionMode,
}

fn default_group() -> String {
    DEFAULT_ENTRY_GROUP.to_owned()
}

impl NamedEntry {
    /// Creates a blocking entry in the default group.
    #[must_use]
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            group: default_group(),
            mode: ExecutionMode::default(),
        }
    }

    /// Replaces the entry group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Replaces the execution mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Entry name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Locator resolved by the worker registry.
    #[must_use]
    pub fn locator(&self) -> &str {
        self.locator.as_str()
    }

    /// Entry group.
    #[must_use]
    pub fn group(&self) -> &str {
        self.group.as_str()
    }

    /// Execution mode.
    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

/// Where a worker's plugin logic comes from. Exactly one form per plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryDescriptor {
    /// A callable resolved from the worker's entry registry.
    Named(NamedEntry),
    /// A program run to completion as the plugin's main logic.
    Script {
        /// Absolute path of the script.
        path: PathBuf,
    },
}

impl EntryDescriptor {
    /// Short description used in logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Named(entry) => format!("{}:{}", entry.group(), entry.locator()),
            Self::Script { path } => path.display().to_string(),
        }
    }
}

/// Everything a worker needs to initialise the client library and run its
/// entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Plugin identifier.
    pub identifier: String,
    /// Backend address, passed through unchanged.
    pub server: String,
    /// Session token of the plugin principal.
    pub identity: SessionToken,
    /// Candidate configuration template inside the plugin source directory.
    pub config_template: PathBuf,
    /// Content gateway address, passed through unchanged.
    pub gateway: String,
    /// Dedicated data directory; becomes the worker's current directory.
    pub data_dir: PathBuf,
    /// Entry to execute.
    pub entry: EntryDescriptor,
    /// Log filter installed by the worker.
    pub log_filter: String,
    /// Log format installed by the worker.
    pub log_format: LogFormat,
}

impl EntryConfig {
    /// Template path when the file exists at the time of the call.
    #[must_use]
    pub fn existing_config_template(&self) -> Option<&Path> {
        let path = self.config_template.as_path();
        path.is_file().then_some(path)
    }
}

#[cfg(test)]
mod tests;
