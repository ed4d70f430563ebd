use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// A connected byte stream implementing `Read` and `Write`.
///
/// Streams handed out by [`WireListener::accept`](crate::WireListener::accept)
/// are already non-blocking: reads and writes return
/// [`std::io::ErrorKind::WouldBlock`] instead of parking the thread.
pub struct WireStream {
    inner: WireStreamInner,
}

enum WireStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
}

impl Read for WireStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            WireStreamInner::Unix(stream) => stream.read(buf),
            WireStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for WireStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            WireStreamInner::Unix(stream) => stream.write(buf),
            WireStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            WireStreamInner::Unix(stream) => stream.flush(),
            WireStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl WireStream {
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: WireStreamInner::Unix(stream),
        }
    }

    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: WireStreamInner::Tcp(stream),
        }
    }

    /// Connect to an endpoint (blocking connect, blocking stream).
    ///
    /// Call [`set_nonblocking`](Self::set_nonblocking) before handing the
    /// stream to a readiness-driven connection.
    pub fn connect(endpoint: &Endpoint) -> Result<Self> {
        let connect_err = |source| TransportError::Connect {
            endpoint: endpoint.to_string(),
            source,
        };

        let stream = match endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                Self::from_unix(std::os::unix::net::UnixStream::connect(path).map_err(connect_err)?)
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => {
                return Err(connect_err(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "unix domain sockets are not available on this platform",
                )))
            }
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).map_err(connect_err)?;
                stream.set_nodelay(true)?;
                Self::from_tcp(stream)
            }
        };

        debug!(%endpoint, "connected");
        Ok(stream)
    }

    /// Switch the stream between blocking and non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        let result = match &self.inner {
            #[cfg(unix)]
            WireStreamInner::Unix(stream) => stream.set_nonblocking(nonblocking),
            WireStreamInner::Tcp(stream) => stream.set_nonblocking(nonblocking),
        };
        result.map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            WireStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
            WireStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
        }
    }

    /// Shut down both halves of the stream.
    ///
    /// A peer that already went away is not an error.
    pub fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            #[cfg(unix)]
            WireStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
            WireStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            WireStreamInner::Unix(_) => "unix-domain-socket",
            WireStreamInner::Tcp(_) => "tcp",
        }
    }

    /// Human-readable peer description, used in log fields.
    pub fn peer_label(&self) -> String {
        match &self.inner {
            #[cfg(unix)]
            WireStreamInner::Unix(stream) => stream
                .peer_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|p| p.display().to_string()))
                .unwrap_or_else(|| "unix:<unnamed>".to_string()),
            WireStreamInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:<unknown>".to_string()),
        }
    }
}

impl std::fmt::Debug for WireStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
