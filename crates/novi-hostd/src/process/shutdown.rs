//! Termination signals.

use std::fmt;
use std::io;
use std::sync::Mutex;

use nix::sys::signal::Signal;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;

/// Signals that stop the host.
const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Why the host left its serving state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// A termination signal arrived.
    Signal(i32),
    /// The host was asked to stop from inside the process.
    Requested,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(number) => match Signal::try_from(*number) {
                Ok(signal) => formatter.write_str(signal.as_str()),
                Err(_) => write!(formatter, "signal {number}"),
            },
            Self::Requested => formatter.write_str("requested"),
        }
    }
}

/// Blocks the host's main thread while it serves.
pub trait ShutdownSignal: Send + Sync {
    /// Returns once the host should stop.
    fn wait(&self) -> Result<ShutdownCause, ShutdownError>;
}

/// Failure to observe termination signals.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The signal handlers could not be registered.
    #[error("failed to register termination signal handlers: {0}")]
    Register(#[source] io::Error),
    /// The signal stream was already consumed by an earlier wait.
    #[error("termination signals were already awaited")]
    AlreadyAwaited,
}

/// Closes a [`SystemShutdownSignal`] without a signal being delivered.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger(Handle);

impl ShutdownTrigger {
    /// Wakes the waiting host with [`ShutdownCause::Requested`].
    pub fn trigger(&self) {
        self.0.close();
    }
}

/// SIGTERM, SIGINT, SIGQUIT and SIGHUP, registered at construction.
///
/// Registering up front holds signals delivered while the fleet is still
/// launching; the host acts on them once it starts waiting.
pub struct SystemShutdownSignal {
    signals: Mutex<Option<Signals>>,
    trigger: ShutdownTrigger,
}

impl SystemShutdownSignal {
    /// Registers the handlers.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Register`] when the handlers cannot be
    /// installed.
    pub fn install() -> Result<Self, ShutdownError> {
        let signals = Signals::new(TERMINATION_SIGNALS).map_err(ShutdownError::Register)?;
        let trigger = ShutdownTrigger(signals.handle());
        Ok(Self {
            signals: Mutex::new(Some(signals)),
            trigger,
        })
    }

    /// A trigger that stops the host without a signal.
    #[must_use]
    pub fn trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<ShutdownCause, ShutdownError> {
        let mut signals = self
            .signals
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or(ShutdownError::AlreadyAwaited)?;
        Ok(signals
            .forever()
            .next()
            .map_or(ShutdownCause::Requested, ShutdownCause::Signal))
    }
}
