//! Unit tests for directory discovery.

use std::fs;
use std::path::Path;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

#[fixture]
fn plugins_root() -> TempDir {
    TempDir::new().expect("temp dir")
}

fn write_plugin(root: &Path, dir: &str, manifest: &str, with_main: bool) {
    let plugin_dir = root.join(dir);
    fs::create_dir_all(&plugin_dir).expect("create plugin dir");
    fs::write(plugin_dir.join(MANIFEST_FILE), manifest).expect("write manifest");
    if with_main {
        fs::write(plugin_dir.join(MAIN_SCRIPT), "#!/bin/sh\n").expect("write script");
    }
}

#[rstest]
fn discovers_script_and_named_plugins(plugins_root: TempDir) {
    write_plugin(plugins_root.path(), "alpha", "identifier: novi.alpha\n", true);
    write_plugin(
        plugins_root.path(),
        "beta",
        "identifier: novi.beta\nentry:\n  name: main\n  locator: echo\n",
        false,
    );

    let records = DirectoryDiscovery::new(plugins_root.path()).discover();
    let identifiers: Vec<_> = records.iter().map(PluginRecord::identifier).collect();
    assert_eq!(identifiers, vec!["novi.alpha", "novi.beta"]);
    assert!(matches!(records[0].entry(), EntryDescriptor::Script { .. }));
    assert!(matches!(records[1].entry(), EntryDescriptor::Named(_)));
    assert!(records[0].source_dir().is_absolute());
}

#[rstest]
fn skips_broken_and_unrelated_directories(plugins_root: TempDir) {
    write_plugin(plugins_root.path(), "good", "identifier: novi.good\n", true);
    write_plugin(plugins_root.path(), "no-entry", "identifier: novi.none\n", false);
    write_plugin(plugins_root.path(), "bad-yaml", "identifier: [unterminated\n", true);
    fs::create_dir_all(plugins_root.path().join("unrelated")).expect("create dir");
    fs::write(plugins_root.path().join("stray.txt"), "not a plugin").expect("write file");

    let records = DirectoryDiscovery::new(plugins_root.path()).discover();
    let identifiers: Vec<_> = records.iter().map(PluginRecord::identifier).collect();
    assert_eq!(identifiers, vec!["novi.good"]);
}

#[rstest]
fn missing_entry_is_a_load_error(plugins_root: TempDir) {
    write_plugin(plugins_root.path(), "lonely", "identifier: novi.lonely\n", false);
    let result = DirectoryDiscovery::load_plugin(&plugins_root.path().join("lonely"))
        .expect("directory is a candidate");
    assert!(matches!(result, Err(ManifestError::MissingEntry { .. })));
}

#[test]
fn missing_root_discovers_nothing() {
    let records = DirectoryDiscovery::new("/nonexistent/novi/plugins").discover();
    assert!(records.is_empty());
}
