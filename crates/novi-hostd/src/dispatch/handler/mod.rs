//! Connection handler serving control requests.

use std::io::{self, Read};
use std::sync::Arc;

use tracing::{debug, warn};

use novi_plugins::{OrchestratorHandle, Spawner};

use crate::health::HealthReporter;
use crate::session::SessionService;
use crate::transport::{ConnectionHandler, ConnectionStream};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::request::ControlRequest;
use super::response::ResponseWriter;
use super::router::route;

/// Maximum size of a single request line in bytes.
pub(crate) const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Reads one request per connection, checks the caller's permission, runs
/// the method and streams the response.
pub struct ControlConnectionHandler<S> {
    orchestrator: OrchestratorHandle<S>,
    sessions: Arc<dyn SessionService>,
    reporter: Arc<dyn HealthReporter>,
}

impl<S> ControlConnectionHandler<S> {
    /// Creates a handler over the shared orchestrator.
    #[must_use]
    pub fn new(
        orchestrator: OrchestratorHandle<S>,
        sessions: Arc<dyn SessionService>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            orchestrator,
            sessions,
            reporter,
        }
    }
}

impl<S: Spawner> ControlConnectionHandler<S> {
    /// Serves one request read from `stream`, writing the response back.
    pub fn serve<T: Read + io::Write>(&self, stream: &mut T) {
        let outcome = match read_request_line(stream) {
            Ok(Some(line)) => self.dispatch(&line),
            Ok(None) => {
                debug!(target: DISPATCH_TARGET, "client disconnected without request");
                return;
            }
            Err(error) => Err(error),
        };

        let mut writer = ResponseWriter::new(stream);
        let written = match outcome {
            Ok(data) => writer.write_result(data),
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    code = error.code(),
                    %error,
                    "control request failed"
                );
                writer.write_error(&error)
            }
        };
        if let Err(error) = written {
            warn!(target: DISPATCH_TARGET, %error, "failed to write response");
        }
    }

    fn dispatch(&self, line: &[u8]) -> Result<serde_json::Value, DispatchError> {
        let request = ControlRequest::parse(line)?;
        let method = request.method()?;
        let identity = request.identity()?;
        let subject = self.sessions.authorize(&identity, method.as_str())?;
        debug!(
            target: DISPATCH_TARGET,
            method = method.as_str(),
            subject = ?subject,
            "dispatching request"
        );
        route(method, &request, &self.orchestrator, self.reporter.as_ref())
    }
}

impl<S> ConnectionHandler for ControlConnectionHandler<S>
where
    S: Spawner + Send + 'static,
{
    fn handle(&self, mut stream: ConnectionStream) {
        self.serve(&mut stream);
    }
}

/// Reads one bounded JSONL line. `Ok(None)` means the client sent nothing.
fn read_request_line<T: Read>(stream: &mut T) -> Result<Option<Vec<u8>>, DispatchError> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let bytes_read = match stream.read(&mut chunk) {
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error.into()),
        };
        if bytes_read == 0 {
            return Ok((!buffer.is_empty()).then_some(buffer));
        }
        let received = chunk.get(..bytes_read).unwrap_or_default();
        if let Some(newline) = received.iter().position(|byte| *byte == b'\n') {
            buffer.extend_from_slice(received.get(..=newline).unwrap_or_default());
            enforce_limit(buffer.len())?;
            return Ok(Some(buffer));
        }
        buffer.extend_from_slice(received);
        enforce_limit(buffer.len())?;
    }
}

fn enforce_limit(size: usize) -> Result<(), DispatchError> {
    if size > MAX_REQUEST_BYTES {
        return Err(DispatchError::RequestTooLarge {
            size,
            max_size: MAX_REQUEST_BYTES,
        });
    }
    Ok(())
}
