//! The worker side of the readiness handshake.

use std::io::{self, Write};
use std::sync::Arc;

use novi_plugins::WorkerMessage;

use crate::error::WorkerError;

/// Single-use readiness signal.
///
/// [`ReadySignal::set`] consumes the value, so readiness is reported at most
/// once per worker.
#[derive(Debug)]
pub struct ReadySignal<W: Write> {
    writer: W,
    identifier: String,
}

impl ReadySignal<io::Stdout> {
    /// Signal written to the process's stdout pipe.
    #[must_use]
    pub fn stdout(identifier: impl Into<String>) -> Self {
        Self::new(io::stdout(), identifier)
    }
}

impl<W: Write> ReadySignal<W> {
    /// Wraps the handshake channel.
    #[must_use]
    pub fn new(writer: W, identifier: impl Into<String>) -> Self {
        Self {
            writer,
            identifier: identifier.into(),
        }
    }

    /// Reports readiness to the host.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Ready`] when the host's pipe cannot be written.
    pub fn set(mut self) -> Result<(), WorkerError> {
        let message = WorkerMessage::Ready {
            identifier: self.identifier,
            pid: std::process::id(),
        };
        let line = message.to_line().map_err(|error| WorkerError::Ready {
            source: Arc::new(io::Error::new(io::ErrorKind::InvalidData, error)),
        })?;
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|source| WorkerError::Ready {
                source: Arc::new(source),
            })
    }
}
