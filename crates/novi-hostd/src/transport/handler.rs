//! Accepted control connections.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;

/// Stream types accepted by the control listener.
#[derive(Debug)]
pub enum ConnectionStream {
    /// TCP client.
    Tcp(TcpStream),
    /// Unix-domain client.
    Unix(UnixStream),
}

/// Byte stream in either direction.
trait Duplex: Read + Write {}

impl<T: Read + Write> Duplex for T {}

impl ConnectionStream {
    /// Transport name used in logs.
    #[must_use]
    pub const fn transport(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Unix(_) => "unix",
        }
    }

    fn duplex(&mut self) -> &mut dyn Duplex {
        match self {
            Self::Tcp(stream) => stream,
            Self::Unix(stream) => stream,
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.duplex().read(buf)
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.duplex().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.duplex().flush()
    }
}

/// Serves accepted control connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Serves one connection to completion, including the response. Runs on
    /// the connection's own thread.
    fn handle(&self, stream: ConnectionStream);
}
