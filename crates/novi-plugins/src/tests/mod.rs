//! Crate-level integration and BDD tests.

use std::time::Duration;

use tempfile::TempDir;

use crate::discovery::DirectoryDiscovery;
use crate::orchestrator::Orchestrator;
use crate::overrides::OverrideTable;
use crate::supervisor::Supervisor;

pub(crate) mod support;

use self::support::{FakeSpawner, StubProvisioner, settings};

#[test]
fn discovered_directory_tree_launches_in_dependency_order() {
    let plugins = TempDir::new().expect("plugins dir");
    let data = TempDir::new().expect("data dir");
    for (dir, manifest) in [
        ("storage", "identifier: novi.storage\n"),
        (
            "search",
            "identifier: novi.search\nrequirements:\n  - depends:novi.storage\n  - python>=3.10\n",
        ),
        (
            "web",
            concat!(
                "identifier: novi.web\nrequirements: [\"depends:novi.search\"]\n",
                "entry:\n  name: main\n  locator: web\n",
            ),
        ),
    ] {
        let path = plugins.path().join(dir);
        std::fs::create_dir_all(&path).expect("plugin dir");
        std::fs::write(path.join("plugin.yaml"), manifest).expect("manifest");
        std::fs::write(path.join("main"), "#!/bin/sh\n").expect("script");
    }

    let spawner = FakeSpawner::new();
    let journal = spawner.journal();
    let mut orchestrator = Orchestrator::prepare(
        &DirectoryDiscovery::new(plugins.path()),
        &OverrideTable::new(),
        &StubProvisioner::new(),
        &settings(data.path()),
        Supervisor::new(spawner, Duration::from_secs(1)),
    )
    .unwrap_or_else(|error| panic!("prepare failed: {error}"));

    let report = orchestrator.launch();
    assert!(report.is_complete());
    assert_eq!(
        journal.with_verb("spawn"),
        vec!["novi.storage", "novi.search", "novi.web"]
    );
    assert!(data.path().join("novi.web").is_dir());
}
