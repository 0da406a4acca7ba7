//! Plugin discovery.
//!
//! [`DirectoryDiscovery`] scans a directory for plugin subdirectories. A
//! subdirectory is a candidate when it contains `plugin.yaml`; candidates that
//! fail to load are logged and skipped so one broken plugin never blocks the
//! fleet.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::entry::EntryDescriptor;
use crate::error::ManifestError;
use crate::manifest::{MANIFEST_FILE, PluginManifest, PluginRecord};

const DISCOVERY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::discovery");

/// Script run when a descriptor declares no named entry.
pub const MAIN_SCRIPT: &str = "main";

/// Source of plugin records.
pub trait PluginSource {
    /// Returns every plugin that loaded successfully.
    fn discover(&self) -> Vec<PluginRecord>;
}

impl PluginSource for Vec<PluginRecord> {
    fn discover(&self) -> Vec<PluginRecord> {
        self.clone()
    }
}

/// Scans one directory for plugin subdirectories.
#[derive(Debug, Clone)]
pub struct DirectoryDiscovery {
    root: PathBuf,
}

impl DirectoryDiscovery {
    /// Creates a scanner for `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Loads the plugin in `directory`, or `None` when it is not a candidate.
    pub fn load_plugin(directory: &Path) -> Option<Result<PluginRecord, ManifestError>> {
        let manifest_path = directory.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return None;
        }
        Some(Self::load_candidate(directory, &manifest_path))
    }

    fn load_candidate(
        directory: &Path,
        manifest_path: &Path,
    ) -> Result<PluginRecord, ManifestError> {
        let source_dir = std::path::absolute(directory).map_err(|source| ManifestError::Read {
            path: directory.to_path_buf(),
            source: source.into(),
        })?;
        let mut manifest = PluginManifest::load(manifest_path)?;
        let entry = match manifest.entry.take() {
            Some(named) => EntryDescriptor::Named(named),
            None => {
                let script = source_dir.join(MAIN_SCRIPT);
                if !script.is_file() {
                    return Err(ManifestError::MissingEntry {
                        directory: source_dir,
                    });
                }
                EntryDescriptor::Script { path: script }
            }
        };
        Ok(PluginRecord::from_manifest(manifest, source_dir, entry))
    }

    fn candidate_directories(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(source) => {
                warn!(
                    target: DISCOVERY_TARGET,
                    path = %self.root.display(),
                    error = %source,
                    "plugin directory is not readable"
                );
                return Vec::new();
            }
        };
        let mut directories: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        directories.sort();
        directories
    }
}

impl PluginSource for DirectoryDiscovery {
    fn discover(&self) -> Vec<PluginRecord> {
        let mut records = Vec::new();
        for directory in self.candidate_directories() {
            match Self::load_plugin(&directory) {
                None => debug!(
                    target: DISCOVERY_TARGET,
                    path = %directory.display(),
                    "directory has no plugin descriptor"
                ),
                Some(Ok(record)) => {
                    debug!(
                        target: DISCOVERY_TARGET,
                        plugin = record.identifier(),
                        entry = %record.entry().describe(),
                        "discovered plugin"
                    );
                    records.push(record);
                }
                Some(Err(failure)) => error!(
                    target: DISCOVERY_TARGET,
                    path = %directory.display(),
                    error = %failure,
                    "skipping plugin that failed to load"
                ),
            }
        }
        records
    }
}

#[cfg(test)]
mod tests;
