//! Accept loop for the control endpoint.
//!
//! A Unix socket path is also the host's single-instance guard: binding
//! fails with [`ListenerError::InUse`] while another host answers on it, and
//! a socket left by a dead host is replaced. The socket file is removed when
//! the listener is dropped, whether or not it was ever started.

use std::fs;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use novi_config::SocketEndpoint;

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

/// Sleep between polls when no client is waiting.
const IDLE_POLL: Duration = Duration::from_millis(25);
/// Sleep after an accept error before trying again.
const RETRY_DELAY: Duration = Duration::from_millis(150);

/// The bound control endpoint.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: SocketEndpoint,
    socket: BoundSocket,
}

#[derive(Debug)]
enum BoundSocket {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl BoundSocket {
    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(true),
            Self::Unix(listener) => listener.set_nonblocking(true),
        }
    }

    /// Next waiting client, switched back to blocking reads.
    fn next_client(&self) -> io::Result<Option<ConnectionStream>> {
        let client = match self {
            Self::Tcp(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Tcp(stream))
            }),
            Self::Unix(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Unix(stream))
            }),
        };
        match client {
            Ok(stream) => Ok(Some(stream)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// What occupies a Unix socket path before binding.
enum ExistingSocket {
    Absent,
    Stale,
    Live,
    Foreign,
}

impl SocketListener {
    /// Binds `endpoint`.
    ///
    /// # Errors
    ///
    /// [`ListenerError::InUse`] when another host serves the Unix socket,
    /// [`ListenerError::NotASocket`] when a regular file occupies its path,
    /// and [`ListenerError::Resolve`] or [`ListenerError::Bind`] when the
    /// endpoint cannot be bound.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let socket = match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                BoundSocket::Tcp(bind_tcp(endpoint, host, *port)?)
            }
            SocketEndpoint::Unix { path } => {
                BoundSocket::Unix(bind_unix(endpoint, path.as_std_path())?)
            }
        };
        info!(
            target: LISTENER_TARGET,
            endpoint = %endpoint,
            "control endpoint bound"
        );
        Ok(Self {
            endpoint: endpoint.clone(),
            socket,
        })
    }

    /// Address a TCP endpoint was bound to; resolves port 0.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.socket {
            BoundSocket::Tcp(listener) => listener.local_addr().ok(),
            BoundSocket::Unix(_) => None,
        }
    }

    /// Serves connections on a background thread until the returned handle
    /// is shut down. Each connection gets its own thread.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Spawn`] when the socket cannot be made
    /// non-blocking or the accept thread cannot be started.
    pub fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        self.socket.set_nonblocking().map_err(ListenerError::Spawn)?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_requested = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(String::from("novi-control"))
            .spawn(move || self.serve(&stop_requested, &handler))
            .map_err(ListenerError::Spawn)?;
        Ok(ListenerHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn serve(&self, stop: &AtomicBool, handler: &Arc<dyn ConnectionHandler>) {
        info!(
            target: LISTENER_TARGET,
            endpoint = %self.endpoint,
            "serving control requests"
        );
        let mut served: u64 = 0;
        let mut failing = false;
        while !stop.load(Ordering::SeqCst) {
            match self.socket.next_client() {
                Ok(Some(stream)) => {
                    failing = false;
                    dispatch(served, stream, handler);
                    served += 1;
                }
                Ok(None) => thread::sleep(IDLE_POLL),
                Err(error) => {
                    if !failing {
                        warn!(
                            target: LISTENER_TARGET,
                            error = %error,
                            "failed to accept control connection"
                        );
                    }
                    failing = true;
                    thread::sleep(RETRY_DELAY);
                }
            }
        }
        info!(
            target: LISTENER_TARGET,
            served,
            "control listener stopped"
        );
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        let SocketEndpoint::Unix { path } = &self.endpoint else {
            return;
        };
        if let Err(error) = fs::remove_file(path.as_std_path())
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: LISTENER_TARGET,
                path = %path,
                error = %error,
                "failed to remove control socket"
            );
        }
    }
}

/// Runs one connection on its own named thread.
fn dispatch(connection: u64, stream: ConnectionStream, handler: &Arc<dyn ConnectionHandler>) {
    debug!(
        target: LISTENER_TARGET,
        connection,
        transport = stream.transport(),
        "control connection accepted"
    );
    let connection_handler = Arc::clone(handler);
    let spawned = thread::Builder::new()
        .name(format!("novi-control-{connection}"))
        .spawn(move || connection_handler.handle(stream));
    if let Err(error) = spawned {
        warn!(
            target: LISTENER_TARGET,
            connection,
            error = %error,
            "dropping control connection; no thread available"
        );
    }
}

/// Stops and joins the accept thread.
#[derive(Debug)]
pub struct ListenerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept loop to stop after its current poll.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit. In-flight connections finish on
    /// their own threads.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Panicked`] when the accept thread panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| ListenerError::Panicked),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bind_tcp(
    endpoint: &SocketEndpoint,
    host: &str,
    port: u16,
) -> Result<TcpListener, ListenerError> {
    let resolve = |source| ListenerError::Resolve {
        endpoint: endpoint.clone(),
        source,
    };
    let address = (host, port)
        .to_socket_addrs()
        .map_err(resolve)?
        .next()
        .ok_or_else(|| resolve(io::Error::from(io::ErrorKind::NotFound)))?;
    TcpListener::bind(address).map_err(|source| ListenerError::Bind {
        endpoint: endpoint.clone(),
        source,
    })
}

fn bind_unix(endpoint: &SocketEndpoint, path: &Path) -> Result<UnixListener, ListenerError> {
    let stale = |source| ListenerError::Stale {
        endpoint: endpoint.clone(),
        source,
    };
    match inspect_existing(path).map_err(stale)? {
        ExistingSocket::Absent => {}
        ExistingSocket::Live => {
            return Err(ListenerError::InUse {
                endpoint: endpoint.clone(),
            });
        }
        ExistingSocket::Foreign => {
            return Err(ListenerError::NotASocket {
                endpoint: endpoint.clone(),
            });
        }
        ExistingSocket::Stale => {
            warn!(
                target: LISTENER_TARGET,
                endpoint = %endpoint,
                "replacing socket left by a previous host"
            );
            fs::remove_file(path).map_err(stale)?;
        }
    }
    UnixListener::bind(path).map_err(|source| ListenerError::Bind {
        endpoint: endpoint.clone(),
        source,
    })
}

/// Classifies whatever occupies `path`; sockets are tested with a connect.
fn inspect_existing(path: &Path) -> io::Result<ExistingSocket> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(ExistingSocket::Absent);
        }
        Err(error) => return Err(error),
    };
    if !metadata.file_type().is_socket() {
        return Ok(ExistingSocket::Foreign);
    }
    match UnixStream::connect(path) {
        Ok(_peer) => Ok(ExistingSocket::Live),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            Ok(ExistingSocket::Stale)
        }
        Err(error) => Err(error),
    }
}
