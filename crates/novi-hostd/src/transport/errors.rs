//! Failures to serve the control endpoint.

use std::io;

use thiserror::Error;

use novi_config::SocketEndpoint;

/// Errors raised while binding or running the control listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// A TCP endpoint's host name did not resolve to any address.
    #[error("control endpoint {endpoint} did not resolve: {source}")]
    Resolve {
        /// Configured endpoint.
        endpoint: SocketEndpoint,
        /// Resolver failure, or `NotFound` when no address came back.
        #[source]
        source: io::Error,
    },
    /// The endpoint could not be bound.
    #[error("failed to bind control endpoint {endpoint}: {source}")]
    Bind {
        /// Configured endpoint.
        endpoint: SocketEndpoint,
        /// Underlying bind failure.
        #[source]
        source: io::Error,
    },
    /// A live host already answers on the socket path.
    #[error("another host is serving {endpoint}")]
    InUse {
        /// Socket endpoint.
        endpoint: SocketEndpoint,
    },
    /// The socket path is occupied by something that is not a socket.
    #[error("{endpoint} points at a file that is not a socket")]
    NotASocket {
        /// Socket endpoint.
        endpoint: SocketEndpoint,
    },
    /// A socket left behind by a dead host could not be inspected or removed.
    #[error("failed to clear stale socket at {endpoint}: {source}")]
    Stale {
        /// Socket endpoint.
        endpoint: SocketEndpoint,
        /// Metadata, connect or removal failure.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be started.
    #[error("failed to start control listener thread: {0}")]
    Spawn(#[source] io::Error),
    /// The accept thread panicked.
    #[error("control listener thread panicked")]
    Panicked,
}
