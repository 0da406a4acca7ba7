//! Test doubles shared by the orchestration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use novi_config::LogFormat;

use crate::entry::{EntryConfig, EntryDescriptor};
use crate::error::{ProvisioningError, SupervisorError};
use crate::manifest::PluginRecord;
use crate::orchestrator::LaunchSettings;
use crate::provision::{IdentityProvisioner, Principal, SessionToken};
use crate::supervisor::{Spawner, WorkerHandle};

/// Lifecycle events observed by the fake spawner, e.g. `spawn:a`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, event: String) {
        self.0.lock().expect("journal lock").push(event);
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.0.lock().expect("journal lock").clone()
    }

    pub(crate) fn clear(&self) {
        self.0.lock().expect("journal lock").clear();
    }

    /// Identifiers of events with the given verb, in order.
    pub(crate) fn with_verb(&self, verb: &str) -> Vec<String> {
        let prefix = format!("{verb}:");
        self.events()
            .into_iter()
            .filter_map(|event| event.strip_prefix(&prefix).map(str::to_owned))
            .collect()
    }
}

/// Spawner whose workers are in-memory flags.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSpawner {
    journal: Journal,
    failing: Arc<Mutex<BTreeSet<String>>>,
    alive: Arc<Mutex<BTreeMap<String, Arc<AtomicBool>>>>,
    next_pid: Arc<AtomicU32>,
}

impl FakeSpawner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Makes every later spawn of `identifier` fail its handshake.
    pub(crate) fn fail(&self, identifier: &str) {
        self.failing
            .lock()
            .expect("failing lock")
            .insert(identifier.to_owned());
    }

    /// Lets `identifier` start again.
    pub(crate) fn recover(&self, identifier: &str) {
        self.failing.lock().expect("failing lock").remove(identifier);
    }

    /// Simulates a worker crash.
    pub(crate) fn crash(&self, identifier: &str) {
        if let Some(flag) = self.alive.lock().expect("alive lock").get(identifier) {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&self, config: &EntryConfig) -> Result<Box<dyn WorkerHandle>, SupervisorError> {
        let identifier = config.identifier.clone();
        if self.failing.lock().expect("failing lock").contains(&identifier) {
            self.journal.push(format!("fail:{identifier}"));
            return Err(SupervisorError::ReadinessTimeout {
                identifier,
                timeout: Duration::from_millis(10),
            });
        }
        self.journal.push(format!("spawn:{identifier}"));
        let flag = Arc::new(AtomicBool::new(true));
        self.alive
            .lock()
            .expect("alive lock")
            .insert(identifier.clone(), Arc::clone(&flag));
        let pid = 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeWorker {
            identifier,
            pid,
            alive: flag,
            journal: self.journal.clone(),
        }))
    }
}

struct FakeWorker {
    identifier: String,
    pid: u32,
    alive: Arc<AtomicBool>,
    journal: Journal,
}

impl WorkerHandle for FakeWorker {
    fn id(&self) -> u32 {
        self.pid
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn terminate(self: Box<Self>, _grace: Duration) -> Result<(), SupervisorError> {
        self.alive.store(false, Ordering::SeqCst);
        self.journal.push(format!("terminate:{}", self.identifier));
        Ok(())
    }
}

/// A script-entry record depending on `dependencies`.
pub(crate) fn record(identifier: &str, dependencies: &[&str]) -> PluginRecord {
    PluginRecord::new(
        identifier,
        EntryDescriptor::Script {
            path: PathBuf::from(format!("/plugins/{identifier}/main")),
        },
    )
    .with_source_dir(format!("/plugins/{identifier}"))
    .with_requirements(dependencies.iter().map(|dependency| format!("depends:{dependency}")))
}

/// Entry configuration for `identifier` with placeholder values.
pub(crate) fn entry_config(identifier: &str) -> EntryConfig {
    EntryConfig {
        identifier: identifier.to_owned(),
        server: "unix:/tmp/novi.socket".into(),
        identity: SessionToken::new(format!("token-{identifier}")),
        config_template: PathBuf::from(format!("/plugins/{identifier}/config-template.yaml")),
        gateway: "http://127.0.0.1:8080".into(),
        data_dir: PathBuf::from(format!("/data/{identifier}")),
        entry: EntryDescriptor::Script {
            path: PathBuf::from(format!("/plugins/{identifier}/main")),
        },
        log_filter: "info".into(),
        log_format: LogFormat::Compact,
    }
}

/// Launch settings rooted in `data_path`.
pub(crate) fn settings(data_path: impl Into<PathBuf>) -> LaunchSettings {
    LaunchSettings {
        server: "unix:/tmp/novi.socket".into(),
        gateway: "http://127.0.0.1:8080".into(),
        data_path: data_path.into(),
        log_filter: "info".into(),
        log_format: LogFormat::Compact,
    }
}

/// Provisioner that grants every request except for denied identifiers.
#[derive(Debug, Default)]
pub(crate) struct StubProvisioner {
    denied: BTreeSet<String>,
    grants: Mutex<BTreeMap<String, (BTreeSet<String>, bool)>>,
}

impl StubProvisioner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn deny(mut self, identifier: &str) -> Self {
        self.denied.insert(identifier.to_owned());
        self
    }

    /// Permissions and elevation last granted to `identifier`.
    pub(crate) fn grant(&self, identifier: &str) -> Option<(BTreeSet<String>, bool)> {
        self.grants
            .lock()
            .expect("grants lock")
            .get(identifier)
            .cloned()
    }

    pub(crate) fn provisioned(&self) -> Vec<String> {
        self.grants
            .lock()
            .expect("grants lock")
            .keys()
            .cloned()
            .collect()
    }
}

impl IdentityProvisioner for StubProvisioner {
    fn provision(
        &self,
        identifier: &str,
        permissions: &BTreeSet<String>,
        elevated: bool,
    ) -> Result<Principal, ProvisioningError> {
        if self.denied.contains(identifier) {
            return Err(ProvisioningError::Unreachable {
                message: format!("backend refused {identifier}"),
            });
        }
        self.grants
            .lock()
            .expect("grants lock")
            .insert(identifier.to_owned(), (permissions.clone(), elevated));
        Ok(Principal::new(identifier, elevated))
    }

    fn login_as(&self, principal: &Principal) -> Result<SessionToken, ProvisioningError> {
        Ok(SessionToken::new(format!("token-{}", principal.name())))
    }
}
