//! Response framing for the control surface.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use super::errors::DispatchError;

/// Response messages sent to clients, one JSONL line each. Every response
/// ends with exactly one `Exit`.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostMessage {
    /// Method result.
    Result {
        /// Method-specific payload.
        data: Value,
    },
    /// Failure description.
    Error {
        /// Stable error code.
        code: &'static str,
        /// Human-readable message.
        message: String,
    },
    /// Terminal message.
    Exit {
        /// 0 on success, 1 for request errors, 2 for host failures.
        status: i32,
    },
}

/// Writer that serialises host messages to a stream.
#[derive(Debug)]
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Wraps an output stream.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one message as a JSONL line.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the message cannot be serialised or
    /// written.
    pub fn write_message(&mut self, message: &HostMessage) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Writes a successful result followed by `exit 0`.
    ///
    /// # Errors
    ///
    /// As [`Self::write_message`].
    pub fn write_result(&mut self, data: Value) -> Result<(), DispatchError> {
        self.write_message(&HostMessage::Result { data })?;
        self.write_exit(0)
    }

    /// Writes an exit message and flushes the stream.
    ///
    /// # Errors
    ///
    /// As [`Self::write_message`].
    pub fn write_exit(&mut self, status: i32) -> Result<(), DispatchError> {
        self.write_message(&HostMessage::Exit { status })?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes `error` followed by its exit status.
    ///
    /// # Errors
    ///
    /// As [`Self::write_message`].
    pub fn write_error(&mut self, error: &DispatchError) -> Result<(), DispatchError> {
        self.write_message(&HostMessage::Error {
            code: error.code(),
            message: error.to_string(),
        })?;
        self.write_exit(error.exit_status())
    }
}
