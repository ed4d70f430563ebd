use std::io::ErrorKind;
use std::net::TcpListener;
#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
#[cfg(unix)]
use std::os::unix::net::UnixListener;
#[cfg(unix)]
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::stream::WireStream;

/// Non-blocking listener over a Unix domain socket or TCP.
///
/// [`accept`](Self::accept) never parks the calling thread; it is meant to be
/// polled by whatever drives readiness for the process.
pub struct WireListener {
    inner: ListenerInner,
    endpoint: Endpoint,
}

enum ListenerInner {
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        path: PathBuf,
        created_inode: (u64, u64),
    },
    Tcp(TcpListener),
}

impl WireListener {
    /// Permission mode for created socket files.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// `sockaddr_un.sun_path` is 108 bytes on Linux, 104 on macOS and the BSDs.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on `endpoint` in non-blocking mode.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        let inner = match endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => Self::bind_unix(path)?,
            #[cfg(not(unix))]
            Endpoint::Unix(_) => {
                return Err(TransportError::Bind {
                    endpoint: endpoint.to_string(),
                    source: std::io::Error::new(
                        ErrorKind::Unsupported,
                        "unix domain sockets are not available on this platform",
                    ),
                })
            }
            Endpoint::Tcp(addr) => {
                let bind_err = |source| TransportError::Bind {
                    endpoint: endpoint.to_string(),
                    source,
                };
                let listener = TcpListener::bind(addr.as_str()).map_err(bind_err)?;
                listener.set_nonblocking(true).map_err(bind_err)?;
                ListenerInner::Tcp(listener)
            }
        };

        let listener = Self {
            inner,
            endpoint: endpoint.clone(),
        };
        info!(endpoint = %listener.local_endpoint(), "listening");
        Ok(listener)
    }

    #[cfg(unix)]
    fn bind_unix(path: &Path) -> Result<ListenerInner> {
        let path_len = path.as_os_str().len();
        if path_len >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path: path.to_path_buf(),
                len: path_len,
                max: Self::MAX_PATH_LEN,
            });
        }

        let path = path.to_path_buf();
        let bind_err = |source| TransportError::Bind {
            endpoint: format!("unix:{}", path.display()),
            source,
        };

        // A leftover socket from a previous run is replaced; anything else is
        // left alone.
        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        std::fs::set_permissions(
            &path,
            std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE),
        )
        .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        Ok(ListenerInner::Unix {
            listener,
            created_inode: (created.dev(), created.ino()),
            path,
        })
    }

    /// Accept one pending connection.
    ///
    /// Returns `Ok(None)` when nothing is waiting. Accepted streams are
    /// switched to non-blocking mode.
    pub fn accept(&self) -> Result<Option<WireStream>> {
        let accepted = match &self.inner {
            #[cfg(unix)]
            ListenerInner::Unix { listener, .. } => listener
                .accept()
                .map(|(stream, _addr)| WireStream::from_unix(stream)),
            ListenerInner::Tcp(listener) => listener.accept().and_then(|(stream, _addr)| {
                stream.set_nodelay(true)?;
                Ok(WireStream::from_tcp(stream))
            }),
        };

        match accepted {
            Ok(stream) => {
                stream.set_nonblocking(true)?;
                debug!(peer = %stream.peer_label(), "accepted connection");
                Ok(Some(stream))
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    /// The endpoint this listener is bound to.
    ///
    /// For TCP listeners bound to port 0 this reports the assigned port.
    pub fn local_endpoint(&self) -> Endpoint {
        match &self.inner {
            ListenerInner::Tcp(listener) => listener
                .local_addr()
                .map(|addr| Endpoint::Tcp(addr.to_string()))
                .unwrap_or_else(|_| self.endpoint.clone()),
            #[cfg(unix)]
            ListenerInner::Unix { .. } => self.endpoint.clone(),
        }
    }
}

#[cfg(unix)]
impl Drop for WireListener {
    fn drop(&mut self) {
        let ListenerInner::Unix {
            path,
            created_inode: (dev, ino),
            ..
        } = &self.inner
        else {
            return;
        };

        // Only remove the file if it is still the socket this listener created.
        match std::fs::symlink_metadata(path) {
            Ok(metadata)
                if metadata.file_type().is_socket()
                    && metadata.dev() == *dev
                    && metadata.ino() == *ino =>
            {
                debug!(?path, "cleaning up socket file");
                let _ = std::fs::remove_file(path);
            }
            Ok(_) => debug!(?path, "socket path identity changed; skipping cleanup"),
            Err(_) => {}
        }
    }
}
