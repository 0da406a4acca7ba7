//! Lifecycle tests for the worker's serve loop.

use std::ffi::OsString;

use mockall::Sequence;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use novi_config::LogFormat;
use novi_plugins::{EntryConfig, EntryDescriptor, NamedEntry, SessionToken, WorkerMessage};

use crate::client::MockClientLibrary;
use crate::{WorkerError, builtin_registry, parse_entry_config, serve};
use crate::{ReadySignal, registry::Entry};

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn config(&self, entry: EntryDescriptor) -> EntryConfig {
        EntryConfig {
            identifier: "alpha".into(),
            server: "unix:/tmp/novi.socket".into(),
            identity: SessionToken::new("token"),
            config_template: self.dir.path().join("config-template.yaml"),
            gateway: "http://127.0.0.1:8080".into(),
            data_dir: self.dir.path().to_path_buf(),
            entry,
            log_filter: "info".into(),
            log_format: LogFormat::Compact,
        }
    }
}

#[fixture]
fn workspace() -> Workspace {
    Workspace {
        dir: TempDir::new().expect("temp dir"),
    }
}

fn idle() -> EntryDescriptor {
    EntryDescriptor::Named(NamedEntry::new("main", "idle"))
}

fn ready_identifier(buffer: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(buffer).ok()?;
    match WorkerMessage::parse_line(text).ok()? {
        WorkerMessage::Ready { identifier, .. } => Some(identifier),
    }
}

#[rstest]
fn serve_initialises_runs_signals_then_joins(workspace: Workspace) {
    let config = workspace.config(idle());
    let mut sequence = Sequence::new();
    let mut client = MockClientLibrary::new();
    client
        .expect_initialize()
        .withf(|context| context.identifier == "alpha" && context.config_template.is_none())
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| Ok(()));
    client
        .expect_join()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|| Ok(()));

    let mut buffer = Vec::new();
    serve(
        &config,
        &builtin_registry(),
        &mut client,
        ReadySignal::new(&mut buffer, "alpha"),
    )
    .expect("worker should serve");
    assert_eq!(ready_identifier(&buffer).as_deref(), Some("alpha"));
}

#[rstest]
fn serve_passes_existing_template(workspace: Workspace) {
    let config = workspace.config(idle());
    std::fs::write(&config.config_template, "a: 1\n").expect("write template");
    let expected = config.config_template.clone();
    let mut client = MockClientLibrary::new();
    client
        .expect_initialize()
        .withf(move |context| context.config_template.as_deref() == Some(expected.as_path()))
        .returning(|_| Ok(()));
    client.expect_join().returning(|| Ok(()));

    serve(
        &config,
        &builtin_registry(),
        &mut client,
        ReadySignal::new(Vec::new(), "alpha"),
    )
    .expect("worker should serve");
}

fn refuse(_: &crate::ClientContext) -> crate::EntryResult {
    Err("no database".into())
}

#[rstest]
fn failing_entry_never_signals_ready(workspace: Workspace) {
    let config = workspace.config(EntryDescriptor::Named(NamedEntry::new("main", "refuse")));
    let registry = builtin_registry().with_entry(
        novi_plugins::entry::DEFAULT_ENTRY_GROUP,
        "refuse",
        Entry::Blocking(refuse),
    );
    let mut client = MockClientLibrary::new();
    client.expect_initialize().returning(|_| Ok(()));
    client.expect_join().never();

    let mut buffer = Vec::new();
    let error = serve(
        &config,
        &registry,
        &mut client,
        ReadySignal::new(&mut buffer, "alpha"),
    )
    .expect_err("entry failure");
    assert!(matches!(error, WorkerError::Entry { .. }));
    assert!(buffer.is_empty());
}

#[rstest]
fn client_initialisation_failure_skips_entry(workspace: Workspace) {
    let config = workspace.config(idle());
    let mut client = MockClientLibrary::new();
    client.expect_initialize().returning(|_| {
        Err(WorkerError::Client {
            message: "backend unreachable".into(),
        })
    });
    client.expect_join().never();

    let mut buffer = Vec::new();
    let error = serve(
        &config,
        &builtin_registry(),
        &mut client,
        ReadySignal::new(&mut buffer, "alpha"),
    )
    .expect_err("client failure");
    assert!(matches!(error, WorkerError::Client { .. }));
    assert!(buffer.is_empty());
}

#[cfg(unix)]
#[rstest]
fn script_entry_runs_before_readiness(workspace: Workspace) {
    use std::os::unix::fs::PermissionsExt;

    let script = workspace.dir.path().join("main");
    std::fs::write(&script, "#!/bin/sh\ntouch ran\n").expect("write script");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    let config = workspace.config(EntryDescriptor::Script {
        path: script.clone(),
    });
    let mut client = MockClientLibrary::new();
    client.expect_initialize().returning(|_| Ok(()));
    client.expect_join().returning(|| Ok(()));

    let mut buffer = Vec::new();
    serve(
        &config,
        &builtin_registry(),
        &mut client,
        ReadySignal::new(&mut buffer, "alpha"),
    )
    .expect("script entry");
    assert!(workspace.dir.path().join("ran").exists());
    assert!(ready_identifier(&buffer).is_some());
}

#[test]
fn entry_config_round_trips_through_the_environment_value() {
    let dir = TempDir::new().expect("temp dir");
    let config = Workspace { dir }.config(idle());
    let raw = serde_json::to_string(&config).expect("encode");
    let parsed = parse_entry_config(Some(OsString::from(raw))).expect("decode");
    assert_eq!(parsed, config);
}

#[rstest]
#[case(None)]
#[case(Some("not json"))]
fn rejects_missing_or_malformed_configuration(#[case] raw: Option<&str>) {
    let error = parse_entry_config(raw.map(OsString::from)).expect_err("invalid config");
    assert!(matches!(error, WorkerError::Config { .. }));
}
