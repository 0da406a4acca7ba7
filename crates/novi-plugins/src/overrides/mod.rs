//! Per-deployment plugin overrides.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// Deployment settings for one plugin. Absence means the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOverride {
    /// Excludes the plugin from the launch.
    pub disabled: bool,
    /// Permissions unioned with the declared set.
    pub extra_permissions: BTreeSet<String>,
    /// Grants the plugin principal the administrative role.
    pub elevated: bool,
}

impl PluginOverride {
    /// Declared permissions plus the extra permissions.
    #[must_use]
    pub fn effective_permissions(&self, declared: &BTreeSet<String>) -> BTreeSet<String> {
        declared.union(&self.extra_permissions).cloned().collect()
    }
}

/// Overrides keyed by plugin identifier.
///
/// Loaded from a YAML mapping:
///
/// ```yaml
/// novi.echo:
///   disabled: true
/// novi.admin:
///   elevated: true
///   extra_permissions: [user.manage]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideTable {
    entries: BTreeMap<String, PluginOverride>,
}

impl OverrideTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an overrides document.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] when the document is not a mapping of
    /// identifiers to overrides.
    pub fn from_yaml(text: &str, origin: &Path) -> Result<Self, ManifestError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_saphyr::from_str(text).map_err(|error| ManifestError::Parse {
            path: origin.to_path_buf(),
            message: error.to_string(),
        })
    }

    /// Reads and parses an overrides file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Read`] when the file cannot be read, otherwise
    /// as [`Self::from_yaml`].
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?;
        Self::from_yaml(&text, path)
    }

    /// Sets the override for `identifier`.
    pub fn insert(&mut self, identifier: impl Into<String>, entry: PluginOverride) {
        self.entries.insert(identifier.into(), entry);
    }

    /// Override for `identifier`, or the defaults.
    #[must_use]
    pub fn get(&self, identifier: &str) -> PluginOverride {
        self.entries.get(identifier).cloned().unwrap_or_default()
    }
}
