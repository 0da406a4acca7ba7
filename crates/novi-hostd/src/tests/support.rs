//! Shared fixtures for host tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde_json::Value;
use tempfile::TempDir;

use novi_config::{Config, LogFormat, SocketEndpoint};
use novi_plugins::{
    EntryConfig, LaunchReport, RestartError, SessionToken, Spawner, SupervisorError,
    WorkerHandle,
};

use crate::bootstrap::{BootstrapError, ConfigLoader, Host, StaticConfigLoader, bootstrap_with};
use crate::dispatch::ControlConnectionHandler;
use crate::health::HealthReporter;
use crate::process::ShutdownCause;

pub(crate) const MASTER_KEY: &str = "test-master-key";

// ---------------------------------------------------------------------------
// Spawner
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SpawnerState {
    events: Vec<String>,
    failing: BTreeSet<String>,
    identities: BTreeMap<String, SessionToken>,
}

/// Spawner that records lifecycle events instead of starting processes.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSpawner {
    state: Arc<Mutex<SpawnerState>>,
    next_pid: Arc<AtomicU32>,
}

impl RecordingSpawner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes every later spawn of `identifier` fail its handshake.
    pub(crate) fn fail(&self, identifier: &str) {
        self.state
            .lock()
            .expect("spawner lock")
            .failing
            .insert(identifier.to_owned());
    }

    /// Recorded events such as `spawn:storage` or `terminate:storage`.
    pub(crate) fn events(&self) -> Vec<String> {
        self.state.lock().expect("spawner lock").events.clone()
    }

    /// Identifiers of recorded events with the given verb, in order.
    pub(crate) fn with_verb(&self, verb: &str) -> Vec<String> {
        let prefix = format!("{verb}:");
        self.events()
            .into_iter()
            .filter_map(|event| event.strip_prefix(&prefix).map(str::to_owned))
            .collect()
    }

    /// Session token handed to the most recent worker for `identifier`.
    pub(crate) fn identity(&self, identifier: &str) -> Option<SessionToken> {
        self.state
            .lock()
            .expect("spawner lock")
            .identities
            .get(identifier)
            .cloned()
    }

    fn record(&self, event: String) {
        self.state.lock().expect("spawner lock").events.push(event);
    }
}

impl Spawner for RecordingSpawner {
    fn spawn(&self, config: &EntryConfig) -> Result<Box<dyn WorkerHandle>, SupervisorError> {
        let identifier = config.identifier.clone();
        {
            let mut state = self.state.lock().expect("spawner lock");
            if state.failing.contains(&identifier) {
                state.events.push(format!("fail:{identifier}"));
                return Err(SupervisorError::ExitedBeforeReady {
                    identifier,
                    status: Some(1),
                });
            }
            state
                .identities
                .insert(identifier.clone(), config.identity.clone());
        }
        self.record(format!("spawn:{identifier}"));
        let pid = 4000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingWorker {
            identifier,
            pid,
            alive: AtomicBool::new(true),
            spawner: self.clone(),
        }))
    }
}

struct RecordingWorker {
    identifier: String,
    pid: u32,
    alive: AtomicBool,
    spawner: RecordingSpawner,
}

impl WorkerHandle for RecordingWorker {
    fn id(&self) -> u32 {
        self.pid
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn terminate(self: Box<Self>, _grace: Duration) -> Result<(), SupervisorError> {
        self.alive.store(false, Ordering::SeqCst);
        self.spawner.record(format!("terminate:{}", self.identifier));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Health reporter
// ---------------------------------------------------------------------------

/// Lifecycle events captured by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    FleetLaunched { started: Vec<String> },
    PluginRestarted { identifier: String, restarted: Vec<String> },
    RestartFailed(String),
    Serving(String),
    Stopping(ShutdownCause),
}

/// Reporter that records every notification.
#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events.lock().expect("reporter lock").clone()
    }

    fn push(&self, event: HealthEvent) {
        self.events.lock().expect("reporter lock").push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.push(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.push(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.push(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn fleet_launched(&self, report: &LaunchReport) {
        self.push(HealthEvent::FleetLaunched {
            started: report.started.clone(),
        });
    }

    fn plugin_restarted(&self, identifier: &str, restarted: &[String]) {
        self.push(HealthEvent::PluginRestarted {
            identifier: identifier.to_owned(),
            restarted: restarted.to_vec(),
        });
    }

    fn restart_failed(&self, error: &RestartError) {
        self.push(HealthEvent::RestartFailed(error.to_string()));
    }

    fn serving(&self, endpoint: &SocketEndpoint) {
        self.push(HealthEvent::Serving(endpoint.to_string()));
    }

    fn stopping(&self, cause: ShutdownCause) {
        self.push(HealthEvent::Stopping(cause));
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Temporary plugin directory tree plus the runtime and data directories.
pub(crate) struct PluginTree {
    root: TempDir,
}

impl PluginTree {
    pub(crate) fn new() -> Self {
        let root = TempDir::new().expect("temporary root");
        fs::create_dir_all(root.path().join("plugins")).expect("plugins directory");
        Self { root }
    }

    /// Writes a plugin descriptor running the built-in `idle` entry.
    pub(crate) fn add(&self, identifier: &str, dependencies: &[&str], permissions: &[&str]) {
        let directory = self.root.path().join("plugins").join(identifier);
        fs::create_dir_all(&directory).expect("plugin directory");
        let requirements: Vec<String> = dependencies
            .iter()
            .map(|dependency| format!("\"depends:{dependency}\""))
            .collect();
        let granted: Vec<String> = permissions
            .iter()
            .map(|permission| format!("\"{permission}\""))
            .collect();
        let descriptor = format!(
            concat!(
                "identifier: {identifier}\nrequirements: [{}]\npermissions: [{}]\n",
                "entry:\n  name: main\n  locator: idle\n",
            ),
            requirements.join(", "),
            granted.join(", "),
            identifier = identifier,
        );
        fs::write(directory.join("plugin.yaml"), descriptor).expect("write descriptor");
    }

    /// Configuration rooted in the temporary tree.
    pub(crate) fn config(&self) -> Config {
        let root = self.root.path();
        let socket = root.join("run").join("novi-hostd.sock");
        Config {
            master_key: Some(MASTER_KEY.to_owned()),
            plugins_path: root.join("plugins"),
            data_path: root.join("data"),
            control_socket: SocketEndpoint::unix(socket.to_string_lossy().into_owned()),
            readiness_timeout_secs: 5,
            termination_grace_secs: 1,
            log_filter: String::from("warn"),
            log_format: LogFormat::Compact,
            ..Config::default()
        }
    }
}

/// Loader whose configuration is rejected by `ortho_config`.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("novi-hostd"),
            OsString::from("--control-socket"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}

// ---------------------------------------------------------------------------
// In-memory connection
// ---------------------------------------------------------------------------

/// Duplex stream whose input is fixed up front.
pub(crate) struct MemoryStream {
    input: Cursor<Vec<u8>>,
    output: Vec<u8>,
}

impl MemoryStream {
    pub(crate) fn new(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: Cursor::new(input.into()),
            output: Vec::new(),
        }
    }

    /// Response lines decoded as JSON.
    pub(crate) fn messages(&self) -> Vec<Value> {
        String::from_utf8(self.output.clone())
            .expect("utf-8 response")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json response"))
            .collect()
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.input.read(buffer)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        self.output.write(buffer)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Encodes a control request line.
pub(crate) fn request_line(method: &str, identity: Option<&str>, plugin: Option<&str>) -> String {
    let mut request = serde_json::json!({ "method": method });
    if let Some(token) = identity {
        request["identity"] = Value::from(token);
    }
    if let Some(target) = plugin {
        request["arguments"] = serde_json::json!({ "plugin": target });
    }
    format!("{request}\n")
}

// ---------------------------------------------------------------------------
// Behaviour world
// ---------------------------------------------------------------------------

pub(crate) struct TestWorld {
    pub(crate) tree: PluginTree,
    pub(crate) spawner: RecordingSpawner,
    pub(crate) reporter: Arc<RecordingHealthReporter>,
    config_override: Option<Config>,
    failing_loader: bool,
    host: Option<Host<RecordingSpawner>>,
    bootstrap_error: Option<BootstrapError>,
    responses: Vec<Value>,
}

impl TestWorld {
    fn new() -> Self {
        Self {
            tree: PluginTree::new(),
            spawner: RecordingSpawner::new(),
            reporter: Arc::new(RecordingHealthReporter::default()),
            config_override: None,
            failing_loader: false,
            host: None,
            bootstrap_error: None,
            responses: Vec::new(),
        }
    }

    pub(crate) fn use_failing_loader(&mut self) {
        self.failing_loader = true;
    }

    pub(crate) fn drop_master_key(&mut self) {
        let mut config = self.tree.config();
        config.master_key = None;
        self.config_override = Some(config);
    }

    pub(crate) fn bootstrap(&mut self) {
        let reporter: Arc<dyn HealthReporter> = self.reporter.clone();
        let spawner = self.spawner.clone();
        let result = if self.failing_loader {
            bootstrap_with(&FailingConfigLoader, &reporter, |_| spawner)
        } else {
            let config = self
                .config_override
                .clone()
                .unwrap_or_else(|| self.tree.config());
            bootstrap_with(&StaticConfigLoader::new(config), &reporter, |_| spawner)
        };
        match result {
            Ok(host) => self.host = Some(host),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Sends one request as the plugin `caller` and keeps the response.
    pub(crate) fn request_as(&mut self, caller: &str, method: &str, plugin: Option<&str>) {
        let identity = self.spawner.identity(caller);
        let line = request_line(
            method,
            identity.as_ref().map(SessionToken::expose),
            plugin,
        );
        let host = self.host.as_ref().expect("host should be bootstrapped");
        let reporter: Arc<dyn HealthReporter> = self.reporter.clone();
        let handler =
            ControlConnectionHandler::new(host.orchestrator(), host.sessions(), reporter);
        let mut stream = MemoryStream::new(line);
        handler.serve(&mut stream);
        self.responses = stream.messages();
    }

    pub(crate) const fn host(&self) -> Option<&Host<RecordingSpawner>> {
        self.host.as_ref()
    }

    pub(crate) const fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// `data` of the result message, when the last request succeeded.
    pub(crate) fn result_data(&self) -> Option<&Value> {
        self.responses
            .iter()
            .find(|message| message["kind"] == "result")
            .map(|message| &message["data"])
    }

    /// Error code of the last request, when it failed.
    pub(crate) fn error_code(&self) -> Option<&str> {
        self.responses
            .iter()
            .find(|message| message["kind"] == "error")
            .and_then(|message| message["code"].as_str())
    }

    /// Exit status closing the last response.
    pub(crate) fn exit_status(&self) -> Option<i64> {
        self.responses
            .iter()
            .find(|message| message["kind"] == "exit")
            .and_then(|message| message["status"].as_i64())
    }
}

pub(crate) fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
