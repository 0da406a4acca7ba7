//! Real worker processes.
//!
//! [`ProcessSpawner`] runs the worker binary with the entry configuration in
//! its environment and stdout piped back to the host. A reader thread forwards
//! the first stdout line over a channel so the readiness wait can be bounded;
//! it then drains the pipe so the worker never blocks on a full buffer.

use std::env;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{SUPERVISOR_TARGET, Spawner, WorkerHandle};
use crate::entry::EntryConfig;
use crate::error::SupervisorError;
use crate::protocol::{ENTRY_CONFIG_ENV, WorkerMessage};

/// File name of the worker executable.
pub const WORKER_BINARY: &str = "novi-plugin-worker";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

type ReadyLine = io::Result<String>;

/// Spawns plugin workers as child processes.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<String>,
    readiness_timeout: Option<Duration>,
}

impl ProcessSpawner {
    /// Creates a spawner for `program`. `None` waits for readiness forever.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, readiness_timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            readiness_timeout,
        }
    }

    /// Appends arguments passed to every worker.
    #[must_use]
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Resolves the worker executable.
    ///
    /// An explicit path wins; otherwise the worker installed next to the
    /// running executable, falling back to a `PATH` lookup.
    #[must_use]
    pub fn locate_worker(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(WORKER_BINARY)))
            .filter(|candidate| candidate.is_file())
            .unwrap_or_else(|| PathBuf::from(WORKER_BINARY))
    }

    /// Executable used for workers.
    #[must_use]
    pub fn program(&self) -> &Path {
        self.program.as_path()
    }

    fn command(&self, payload: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(ENTRY_CONFIG_ENV, payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        command
    }

    fn await_ready(&self, receiver: &Receiver<ReadyLine>) -> Result<ReadyLine, Duration> {
        match self.readiness_timeout {
            Some(timeout) => match receiver.recv_timeout(timeout) {
                Ok(line) => Ok(line),
                Err(RecvTimeoutError::Timeout) => Err(timeout),
                Err(RecvTimeoutError::Disconnected) => Ok(Ok(String::new())),
            },
            None => Ok(receiver.recv().unwrap_or_else(|_| Ok(String::new()))),
        }
    }
}

impl Spawner for ProcessSpawner {
    fn spawn(&self, config: &EntryConfig) -> Result<Box<dyn WorkerHandle>, SupervisorError> {
        let identifier = config.identifier.as_str();
        let payload =
            serde_json::to_string(config).map_err(|source| SupervisorError::Serialize {
                identifier: identifier.to_owned(),
                source: Arc::new(source),
            })?;

        debug!(
            target: SUPERVISOR_TARGET,
            plugin = identifier,
            program = %self.program.display(),
            "starting worker process"
        );
        let mut child = self
            .command(&payload)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                identifier: identifier.to_owned(),
                source: Arc::new(source),
            })?;

        let Some(stdout) = child.stdout.take() else {
            reap(&mut child);
            return Err(SupervisorError::Handshake {
                identifier: identifier.to_owned(),
                message: String::from("worker stdout was not captured"),
            });
        };
        let receiver = match forward_ready_line(identifier, stdout) {
            Ok(receiver) => receiver,
            Err(source) => {
                reap(&mut child);
                return Err(SupervisorError::Spawn {
                    identifier: identifier.to_owned(),
                    source: Arc::new(source),
                });
            }
        };

        match self.await_ready(&receiver) {
            Ok(Ok(line)) => {
                if let Err(error) = check_ready_line(identifier, &line, &mut child) {
                    reap(&mut child);
                    return Err(error);
                }
            }
            Ok(Err(source)) => {
                reap(&mut child);
                return Err(SupervisorError::Handshake {
                    identifier: identifier.to_owned(),
                    message: source.to_string(),
                });
            }
            Err(timeout) => {
                reap(&mut child);
                return Err(SupervisorError::ReadinessTimeout {
                    identifier: identifier.to_owned(),
                    timeout,
                });
            }
        }

        Ok(Box::new(ProcessWorker {
            identifier: identifier.to_owned(),
            child: Some(child),
        }))
    }
}

fn forward_ready_line(identifier: &str, stdout: ChildStdout) -> io::Result<Receiver<ReadyLine>> {
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name(format!("novi-ready-{identifier}"))
        .spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            let result = reader.read_line(&mut line).map(|_| line);
            let delivered = sender.send(result).is_ok();
            if delivered {
                let _drained = io::copy(&mut reader, &mut io::sink());
            }
        })?;
    Ok(receiver)
}

fn check_ready_line(
    identifier: &str,
    line: &str,
    child: &mut Child,
) -> Result<(), SupervisorError> {
    if line.is_empty() {
        let status = wait_briefly(child);
        return Err(SupervisorError::ExitedBeforeReady {
            identifier: identifier.to_owned(),
            status: status.and_then(|status| status.code()),
        });
    }
    match WorkerMessage::parse_line(line) {
        Ok(WorkerMessage::Ready {
            identifier: reported,
            ..
        }) if reported == identifier => Ok(()),
        Ok(WorkerMessage::Ready {
            identifier: reported,
            ..
        }) => Err(SupervisorError::Handshake {
            identifier: identifier.to_owned(),
            message: format!("worker reported readiness for '{reported}'"),
        }),
        Err(error) => Err(SupervisorError::Handshake {
            identifier: identifier.to_owned(),
            message: format!("malformed readiness line: {error}"),
        }),
    }
}

/// Waits a short while for a worker that closed its stdout to exit.
fn wait_briefly(child: &mut Child) -> Option<ExitStatus> {
    let deadline = Instant::now() + Duration::from_secs(1);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            Ok(None) | Err(_) => return None,
        }
    }
}

/// Kills and reaps a worker that failed its handshake.
fn reap(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    if let Err(error) = child.kill() {
        debug!(target: SUPERVISOR_TARGET, %error, "kill after failed handshake");
    }
    if let Err(error) = child.wait() {
        warn!(target: SUPERVISOR_TARGET, %error, "failed to reap worker");
    }
}

struct ProcessWorker {
    identifier: String,
    child: Option<Child>,
}

impl ProcessWorker {
    fn terminate_child(&self, child: &mut Child, grace: Duration) -> Result<(), SupervisorError> {
        if let Ok(Some(_)) = child.try_wait() {
            return Ok(());
        }
        self.request_stop(child)?;

        let deadline = Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(
                        target: SUPERVISOR_TARGET,
                        plugin = self.identifier.as_str(),
                        ?status,
                        "worker exited"
                    );
                    return Ok(());
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
                Ok(None) => break,
                Err(source) => return Err(self.terminate_error(source)),
            }
        }

        warn!(
            target: SUPERVISOR_TARGET,
            plugin = self.identifier.as_str(),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "worker ignored termination request; killing"
        );
        child.kill().map_err(|source| self.terminate_error(source))?;
        child
            .wait()
            .map(|_| ())
            .map_err(|source| self.terminate_error(source))
    }

    #[cfg(unix)]
    fn request_stop(&self, child: &Child) -> Result<(), SupervisorError> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let raw = i32::try_from(child.id()).map_err(|_| {
            self.terminate_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "process id out of range",
            ))
        })?;
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(self.terminate_error(io::Error::from(errno))),
        }
    }

    #[cfg(not(unix))]
    fn request_stop(&self, child: &mut Child) -> Result<(), SupervisorError> {
        child.kill().map_err(|source| self.terminate_error(source))
    }

    fn terminate_error(&self, source: io::Error) -> SupervisorError {
        SupervisorError::Terminate {
            identifier: self.identifier.clone(),
            source: Arc::new(source),
        }
    }
}

impl WorkerHandle for ProcessWorker {
    fn id(&self) -> u32 {
        self.child.as_ref().map_or(0, Child::id)
    }

    fn is_alive(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    fn terminate(mut self: Box<Self>, grace: Duration) -> Result<(), SupervisorError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let outcome = self.terminate_child(&mut child, grace);
        if outcome.is_err() {
            self.child = Some(child);
        }
        outcome
    }
}

impl Drop for ProcessWorker {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            reap(child);
        }
    }
}
