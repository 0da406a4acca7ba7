//! Host/worker handshake protocol.
//!
//! The host passes the JSON [`EntryConfig`](crate::entry::EntryConfig) in the
//! [`ENTRY_CONFIG_ENV`] environment variable. The worker answers with exactly
//! one JSONL [`WorkerMessage::Ready`] line on stdout once its entry has run
//! and it has registered with the client library. Nothing else is written to
//! stdout.

use serde::{Deserialize, Serialize};

/// Environment variable carrying the serialised entry configuration.
pub const ENTRY_CONFIG_ENV: &str = "NOVI_ENTRY_CONFIG";

/// Message written by a worker on its handshake channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The worker is initialised and about to enter its join loop.
    Ready {
        /// Plugin identifier.
        identifier: String,
        /// Worker process id.
        pid: u32,
    },
}

impl WorkerMessage {
    /// Encodes the message as a newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Fails only if serialisation fails.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decodes one line, ignoring surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the line is not a worker message.
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}
