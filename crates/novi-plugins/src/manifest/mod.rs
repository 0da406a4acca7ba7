//! Plugin descriptors and the immutable records built from them.
//!
//! A [`PluginManifest`] is the parsed `plugin.yaml`. Discovery combines it
//! with the plugin's source directory and entry descriptor to produce a
//! [`PluginRecord`], which is never mutated afterwards.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entry::{EntryDescriptor, NamedEntry};
use crate::error::ManifestError;

/// File name of a plugin descriptor.
pub const MANIFEST_FILE: &str = "plugin.yaml";

/// Template file name used when a descriptor does not name one.
pub const DEFAULT_CONFIG_TEMPLATE: &str = "config-template.yaml";

/// Version used when a descriptor does not declare one.
pub const DEFAULT_VERSION: &str = "0.1.0";

/// Contents of a `plugin.yaml` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Display name; defaults to the plugin directory name.
    #[serde(default)]
    pub name: Option<String>,
    /// Globally unique identifier.
    pub identifier: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Search keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Plugin version.
    #[serde(default = "default_version")]
    pub version: String,
    /// SPDX licence expression.
    #[serde(default)]
    pub license: Option<String>,
    /// Project homepage.
    #[serde(default)]
    pub homepage: Option<String>,
    /// Template file name, relative to the plugin directory.
    #[serde(default = "default_config_template")]
    pub config_template: String,
    /// Permissions granted to the plugin principal.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Dependency references such as `depends:other.plugin`.
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Named entry; a directory without one runs its `main` script.
    #[serde(default)]
    pub entry: Option<NamedEntry>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_owned()
}

fn default_config_template() -> String {
    DEFAULT_CONFIG_TEMPLATE.to_owned()
}

impl PluginManifest {
    /// Parses a descriptor; `origin` is only used for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] for invalid YAML and
    /// [`ManifestError::MissingIdentifier`] when the identifier is blank.
    pub fn from_yaml(text: &str, origin: &Path) -> Result<Self, ManifestError> {
        let manifest: Self =
            serde_saphyr::from_str(text).map_err(|error| ManifestError::Parse {
                path: origin.to_path_buf(),
                message: error.to_string(),
            })?;
        if manifest.identifier.trim().is_empty() {
            return Err(ManifestError::MissingIdentifier {
                path: origin.to_path_buf(),
            });
        }
        Ok(manifest)
    }

    /// Reads and parses a descriptor file.
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
}

/// Informational fields reported by `plugin.list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Plugin identifier.
    pub identifier: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Search keywords.
    pub keywords: Vec<String>,
    /// Plugin version.
    pub version: String,
    /// Licence expression.
    pub license: Option<String>,
    /// Project homepage.
    pub homepage: Option<String>,
}

/// An accepted plugin. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRecord {
    metadata: PluginMetadata,
    config_template: String,
    permissions: BTreeSet<String>,
    requirements: Vec<String>,
    source_dir: PathBuf,
    entry: EntryDescriptor,
}

impl PluginRecord {
    /// Creates a record with default metadata; the display name is the
    /// identifier.
    #[must_use]
    pub fn new(identifier: impl Into<String>, entry: EntryDescriptor) -> Self {
        let id: String = identifier.into();
        Self {
            metadata: PluginMetadata {
                name: id.clone(),
                identifier: id,
                description: String::new(),
                keywords: Vec::new(),
                version: default_version(),
                license: None,
                homepage: None,
            },
            config_template: default_config_template(),
            permissions: BTreeSet::new(),
            requirements: Vec::new(),
            source_dir: PathBuf::new(),
            entry,
        }
    }

    /// Builds a record from a parsed descriptor found in `source_dir`.
    #[must_use]
    pub fn from_manifest(
        manifest: PluginManifest,
        source_dir: impl Into<PathBuf>,
        entry: EntryDescriptor,
    ) -> Self {
        let directory: PathBuf = source_dir.into();
        let name = manifest.name.unwrap_or_else(|| {
            directory.file_name().map_or_else(
                || manifest.identifier.clone(),
                |name| name.to_string_lossy().into_owned(),
            )
        });
        Self {
            metadata: PluginMetadata {
                identifier: manifest.identifier,
                name,
                description: manifest.description,
                keywords: manifest.keywords,
                version: manifest.version,
                license: manifest.license,
                homepage: manifest.homepage,
            },
            config_template: manifest.config_template,
            permissions: manifest.permissions,
            requirements: manifest.requirements,
            source_dir: directory,
            entry,
        }
    }

    /// Replaces the dependency references.
    #[must_use]
    pub fn with_requirements<I, R>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.requirements = requirements.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the declared permissions.
    #[must_use]
    pub fn with_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the source directory.
    #[must_use]
    pub fn with_source_dir(mut self, source_dir: impl Into<PathBuf>) -> Self {
        self.source_dir = source_dir.into();
        self
    }

    /// Globally unique identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.metadata.identifier.as_str()
    }

    /// Informational metadata.
    #[must_use]
    pub const fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// Declared permissions.
    #[must_use]
    pub const fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    /// Raw dependency references.
    #[must_use]
    pub fn requirements(&self) -> &[String] {
        &self.requirements
    }

    /// Directory the plugin was discovered in.
    #[must_use]
    pub fn source_dir(&self) -> &Path {
        self.source_dir.as_path()
    }

    /// Template path resolved against the source directory.
    #[must_use]
    pub fn config_template_path(&self) -> PathBuf {
        self.source_dir.join(&self.config_template)
    }

    /// Entry descriptor.
    #[must_use]
    pub const fn entry(&self) -> &EntryDescriptor {
        &self.entry
    }
}
