//! Unit tests for entry descriptors.

use std::fs;
use std::path::PathBuf;

use novi_config::LogFormat;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::provision::SessionToken;

#[fixture]
fn plugin_dir() -> TempDir {
    TempDir::new().expect("temp dir")
}

fn config_in(dir: &TempDir) -> EntryConfig {
    EntryConfig {
        identifier: "alpha".into(),
        server: "unix:/tmp/novi.socket".into(),
        identity: SessionToken::new("token"),
        config_template: dir.path().join("config-template.yaml"),
        gateway: "http://127.0.0.1:8080".into(),
        data_dir: dir.path().join("data"),
        entry: EntryDescriptor::Script {
            path: dir.path().join("main"),
        },
        log_filter: "info".into(),
        log_format: LogFormat::Compact,
    }
}

#[rstest]
fn missing_template_is_reported_as_none(plugin_dir: TempDir) {
    let config = config_in(&plugin_dir);
    assert!(config.existing_config_template().is_none());
}

#[rstest]
fn present_template_is_passed_through(plugin_dir: TempDir) {
    let config = config_in(&plugin_dir);
    fs::write(&config.config_template, "key: value\n").expect("write template");
    assert_eq!(
        config.existing_config_template(),
        Some(config.config_template.as_path())
    );
}

#[test]
fn named_entry_defaults_group_and_mode() {
    let entry: NamedEntry =
        serde_json::from_str(r#"{"name":"main","locator":"echo"}"#).expect("parse");
    assert_eq!(entry.group(), DEFAULT_ENTRY_GROUP);
    assert_eq!(entry.mode(), ExecutionMode::Blocking);
}

#[rstest]
#[case(
    r#"{"kind":"script","path":"/srv/plugins/a/main"}"#,
    EntryDescriptor::Script { path: PathBuf::from("/srv/plugins/a/main") }
)]
#[case(
    r#"{"kind":"named","name":"main","locator":"echo","mode":"awaited"}"#,
    EntryDescriptor::Named(NamedEntry::new("main", "echo").with_mode(ExecutionMode::Awaited))
)]
fn descriptor_is_tagged_by_kind(#[case] json: &str, #[case] expected: EntryDescriptor) {
    let parsed: EntryDescriptor = serde_json::from_str(json).expect("parse");
    assert_eq!(parsed, expected);
}

#[test]
fn describe_renders_group_and_locator() {
    let entry = EntryDescriptor::Named(NamedEntry::new("main", "echo").with_group("custom"));
    assert_eq!(entry.describe(), "custom:echo");
}

#[rstest]
fn entry_config_round_trips_through_json(plugin_dir: TempDir) {
    let config = config_in(&plugin_dir);
    let json = serde_json::to_string(&config).expect("serialise");
    assert!(json.contains("\"identity\":\"token\""));
    let decoded: EntryConfig = serde_json::from_str(&json).expect("deserialise");
    assert_eq!(decoded, config);
}
