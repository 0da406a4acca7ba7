//! Drives the real worker binary through the host's process supervisor.

#![cfg(unix)]

use std::time::Duration;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use novi_config::LogFormat;
use novi_plugins::{
    EntryConfig, EntryDescriptor, ExecutionMode, NamedEntry, ProcessSpawner, SessionToken,
    Supervisor, SupervisorError,
};

struct Host {
    dir: TempDir,
    supervisor: Supervisor<ProcessSpawner>,
}

impl Host {
    fn config(&self, identifier: &str, entry: NamedEntry) -> EntryConfig {
        EntryConfig {
            identifier: identifier.into(),
            server: "unix:/tmp/novi.socket".into(),
            identity: SessionToken::new("token"),
            config_template: self.dir.path().join("config-template.yaml"),
            gateway: "http://127.0.0.1:8080".into(),
            data_dir: self.dir.path().join("data").join(identifier),
            entry: EntryDescriptor::Named(entry),
            log_filter: "warn".into(),
            log_format: LogFormat::Compact,
        }
    }
}

#[fixture]
fn host() -> Host {
    let spawner = ProcessSpawner::new(
        env!("CARGO_BIN_EXE_novi-plugin-worker"),
        Some(Duration::from_secs(10)),
    );
    Host {
        dir: TempDir::new().expect("temp dir"),
        supervisor: Supervisor::new(spawner, Duration::from_secs(5)),
    }
}

#[rstest]
#[case(NamedEntry::new("main", "idle"))]
#[case(NamedEntry::new("main", "idle-async").with_mode(ExecutionMode::Awaited))]
fn worker_signals_ready_and_stops_on_request(mut host: Host, #[case] entry: NamedEntry) {
    let config = host.config("alpha", entry);
    host.supervisor.spawn(&config).expect("worker should become ready");
    assert!(config.data_dir.is_dir());
    assert!(host.supervisor.is_alive("alpha"));

    assert!(host.supervisor.terminate("alpha").expect("terminate"));
    assert!(!host.supervisor.is_alive("alpha"));
}

#[rstest]
fn unknown_entry_fails_before_readiness(mut host: Host) {
    let config = host.config("beta", NamedEntry::new("main", "missing"));
    let error = host
        .supervisor
        .spawn(&config)
        .expect_err("worker should exit early");
    assert!(matches!(error, SupervisorError::ExitedBeforeReady { .. }));
    assert_eq!(host.supervisor.live_count(), 0);
}
