//! Server side of the transport: bind, accept, shutdown

use std::path::PathBuf;
use tokio::net::{TcpListener, UnixListener};
use tracing::{debug, info, warn};

use super::{Connection, ListenAddr, TransportError};

enum Bound {
    Tcp(TcpListener),
    Unix { listener: UnixListener, path: PathBuf },
}

/// Listening endpoint for one address
pub struct Listener {
    addr: ListenAddr,
    bound: Option<Bound>,
}

impl Listener {
    /// Create an endpoint; nothing is bound until `init`
    pub fn new(addr: ListenAddr) -> Self {
        Self { addr, bound: None }
    }

    pub fn addr(&self) -> &ListenAddr {
        &self.addr
    }

    pub fn is_initialized(&self) -> bool {
        self.bound.is_some()
    }

    /// Bind and start listening
    pub async fn init(&mut self) -> Result<(), TransportError> {
        if self.is_initialized() {
            return Err(TransportError::AlreadyInitialized(self.addr.clone()));
        }

        let bound = match &self.addr {
            ListenAddr::Tcp(hostport) => {
                let listener = TcpListener::bind(hostport.as_str()).await.map_err(|source| {
                    TransportError::Bind {
                        addr: self.addr.clone(),
                        source,
                    }
                })?;
                Bound::Tcp(listener)
            }
            ListenAddr::Unix(path) => {
                // A leftover socket file from an unclean shutdown blocks bind.
                if path.exists() {
                    debug!("Removing stale socket file {}", path.display());
                    std::fs::remove_file(path).map_err(|source| TransportError::Bind {
                        addr: self.addr.clone(),
                        source,
                    })?;
                }
                let listener = UnixListener::bind(path).map_err(|source| TransportError::Bind {
                    addr: self.addr.clone(),
                    source,
                })?;
                Bound::Unix {
                    listener,
                    path: path.clone(),
                }
            }
        };

        self.bound = Some(bound);
        info!("Listening on {}", self.local_addr()?);
        Ok(())
    }

    /// The bound address; reports the real port when bound to port 0
    pub fn local_addr(&self) -> Result<ListenAddr, TransportError> {
        match &self.bound {
            Some(Bound::Tcp(listener)) => listener
                .local_addr()
                .map(|sock| ListenAddr::Tcp(sock.to_string()))
                .map_err(|source| TransportError::Bind {
                    addr: self.addr.clone(),
                    source,
                }),
            Some(Bound::Unix { path, .. }) => Ok(ListenAddr::Unix(path.clone())),
            None => Err(TransportError::NotInitialized(self.addr.clone())),
        }
    }

    /// Wait for the next client; returns the stream and a peer label for logs
    pub async fn accept(&self) -> Result<(Connection, String), TransportError> {
        match &self.bound {
            Some(Bound::Tcp(listener)) => {
                let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
                Ok((Connection::Tcp(stream), peer.to_string()))
            }
            Some(Bound::Unix { listener, path }) => {
                let (stream, _peer) = listener.accept().await.map_err(TransportError::Accept)?;
                Ok((Connection::Unix(stream), format!("unix:{}", path.display())))
            }
            None => Err(TransportError::NotInitialized(self.addr.clone())),
        }
    }

    /// Release the socket; Unix-domain sockets also unlink their path
    pub fn shutdown(&mut self) {
        match self.bound.take() {
            Some(Bound::Unix { listener, path }) => {
                drop(listener);
                if let Err(e) = std::fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove socket file {}: {}", path.display(), e);
                    }
                }
                debug!("Closed listener on {}", path.display());
            }
            Some(Bound::Tcp(listener)) => {
                drop(listener);
                debug!("Closed listener on {}", self.addr);
            }
            None => {}
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown();
    }
}
