//! Stream-socket transport over TCP or Unix-domain paths
//!
//! `ListenAddr` selects the address family; `Listener` is the server role
//! (bind, accept, shutdown) and `Connector` the client role. Both hand out
//! `Connection`s that read and write like any tokio stream.

pub mod connection;
pub mod listener;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub use connection::{Connection, Connector};
pub use listener::Listener;

/// Transport failures
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("unsupported address family '{0}' (expected tcp or unix)")]
    UnsupportedFamily(String),

    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    #[error("endpoint {0} is already initialized")]
    AlreadyInitialized(ListenAddr),

    #[error("endpoint {0} is not initialized")]
    NotInitialized(ListenAddr),

    #[error("failed to bind {addr}")]
    Bind {
        addr: ListenAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept connection")]
    Accept(#[source] std::io::Error),

    #[error("failed to connect to {addr}")]
    Connect {
        addr: ListenAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Where the daemon listens, or where a client connects
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ListenAddr {
    /// IP stream socket, `host:port`
    Tcp(String),
    /// Local-domain stream socket at a filesystem path
    Unix(PathBuf),
}

impl ListenAddr {
    pub fn is_unix(&self) -> bool {
        matches!(self, Self::Unix(_))
    }

    pub fn unix_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Unix(path) => Some(path),
            Self::Tcp(_) => None,
        }
    }

    fn parse_tcp(input: &str, original: &str) -> Result<Self, TransportError> {
        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidAddress(original.to_string()))?;
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(TransportError::InvalidAddress(original.to_string()));
        }
        Ok(Self::Tcp(input.to_string()))
    }
}

impl FromStr for ListenAddr {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TransportError::InvalidAddress(s.to_string()));
        }

        if let Some(rest) = s.strip_prefix("tcp://") {
            return Self::parse_tcp(rest, s);
        }
        if let Some(rest) = s.strip_prefix("unix://").or_else(|| s.strip_prefix("unix:")) {
            if rest.is_empty() {
                return Err(TransportError::InvalidAddress(s.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(rest)));
        }
        if let Some((scheme, _)) = s.split_once("://") {
            return Err(TransportError::UnsupportedFamily(scheme.to_string()));
        }
        if s.starts_with('/') || s.starts_with("./") {
            return Ok(Self::Unix(PathBuf::from(s)));
        }

        Self::parse_tcp(s, s)
    }
}

impl TryFrom<String> for ListenAddr {
    type Error = TransportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ListenAddr> for String {
    fn from(addr: ListenAddr) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(hostport) => write!(f, "tcp://{}", hostport),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_forms() {
        assert_eq!(
            "tcp://127.0.0.1:7070".parse::<ListenAddr>().unwrap(),
            ListenAddr::Tcp("127.0.0.1:7070".into())
        );
        assert_eq!(
            "localhost:0".parse::<ListenAddr>().unwrap(),
            ListenAddr::Tcp("localhost:0".into())
        );
        assert_eq!(
            "tcp://[::1]:9000".parse::<ListenAddr>().unwrap(),
            ListenAddr::Tcp("[::1]:9000".into())
        );
    }

    #[test]
    fn test_parse_unix_forms() {
        let expected = ListenAddr::Unix(PathBuf::from("/tmp/mqnamed.sock"));
        assert_eq!("unix:///tmp/mqnamed.sock".parse::<ListenAddr>().unwrap(), expected);
        assert_eq!("unix:/tmp/mqnamed.sock".parse::<ListenAddr>().unwrap(), expected);
        assert_eq!("/tmp/mqnamed.sock".parse::<ListenAddr>().unwrap(), expected);
        assert!(expected.is_unix());
    }

    #[test]
    fn test_unsupported_family_fails_fast() {
        assert!(matches!(
            "udp://127.0.0.1:53".parse::<ListenAddr>(),
            Err(TransportError::UnsupportedFamily(family)) if family == "udp"
        ));
        assert!(matches!(
            "vsock://3:1024".parse::<ListenAddr>(),
            Err(TransportError::UnsupportedFamily(_))
        ));
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in ["", "tcp://nohost", "tcp://:80", "host:notaport", "unix://"] {
            assert!(
                matches!(bad.parse::<ListenAddr>(), Err(TransportError::InvalidAddress(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display_round_trips() {
        for input in ["tcp://127.0.0.1:7070", "unix:///run/mqnamed.sock"] {
            let addr: ListenAddr = input.parse().unwrap();
            assert_eq!(addr.to_string(), input);
        }
    }
}
