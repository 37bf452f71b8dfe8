//! Listen and dial addresses
//!
//! Parchment endpoints are written as URIs in configuration:
//!
//! ```text
//! tcp://host:port        TCP socket
//! unix:///path/to.sock   UNIX socket bound to a filesystem path
//! unix://@name           abstract-namespace UNIX socket (Linux)
//! ```
//!
//! `Address` parses and renders that syntax and knows how to dial or bind
//! itself, returning boxed streams so the session layer is transport
//! agnostic.

use std::fmt;
use std::io;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::session::SessionStream;

/// Keepalive probe interval for long-lived TCP sessions
const TCP_KEEPALIVE_TIME: Duration = Duration::from_secs(30);

/// Errors from parsing an address string
#[derive(Debug, Error)]
pub enum AddrParseError {
    /// Scheme is not `tcp://` or `unix://`
    #[error("unknown address scheme in '{0}'")]
    UnknownScheme(String),

    /// TCP address is missing a usable `host:port`
    #[error("invalid tcp address '{0}': expected host:port")]
    InvalidTcp(String),

    /// UNIX address has an empty path or abstract name
    #[error("invalid unix address '{0}': empty path")]
    EmptyUnixPath(String),

    /// Abstract sockets only exist on Linux
    #[error("abstract unix socket '{0}' is not supported on this platform")]
    AbstractUnsupported(String),
}

/// A parsed listen or dial address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// TCP endpoint as `host:port`
    Tcp(String),

    /// UNIX socket bound to a filesystem path
    #[cfg(unix)]
    Unix(PathBuf),

    /// Abstract-namespace UNIX socket (no filesystem presence)
    #[cfg(any(target_os = "linux", target_os = "android"))]
    UnixAbstract(String),
}

impl FromStr for Address {
    type Err = AddrParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = input.strip_prefix("tcp://") {
            let port_valid = rest
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !port_valid {
                return Err(AddrParseError::InvalidTcp(input.to_string()));
            }
            return Ok(Address::Tcp(rest.to_string()));
        }

        if let Some(rest) = input.strip_prefix("unix://") {
            if let Some(name) = rest.strip_prefix('@') {
                if name.is_empty() {
                    return Err(AddrParseError::EmptyUnixPath(input.to_string()));
                }
                #[cfg(any(target_os = "linux", target_os = "android"))]
                return Ok(Address::UnixAbstract(name.to_string()));
                #[cfg(not(any(target_os = "linux", target_os = "android")))]
                return Err(AddrParseError::AbstractUnsupported(input.to_string()));
            }
            if rest.is_empty() {
                return Err(AddrParseError::EmptyUnixPath(input.to_string()));
            }
            #[cfg(unix)]
            return Ok(Address::Unix(PathBuf::from(rest)));
            #[cfg(not(unix))]
            return Err(AddrParseError::UnknownScheme(input.to_string()));
        }

        Err(AddrParseError::UnknownScheme(input.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            Address::Unix(path) => write!(f, "unix://{}", path.display()),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Address::UnixAbstract(name) => write!(f, "unix://@{name}"),
        }
    }
}

impl Address {
    /// The filesystem path of a non-abstract UNIX address
    ///
    /// Used by listeners to remove stale socket files and apply
    /// configured permissions and ownership.
    #[cfg(unix)]
    pub fn unix_path(&self) -> Option<&Path> {
        match self {
            Address::Unix(path) => Some(path),
            _ => None,
        }
    }

    /// Dial this address, returning a stream ready for a session handshake
    pub async fn connect(&self) -> io::Result<Box<dyn SessionStream>> {
        match self {
            Address::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                configure_tcp(&stream);
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Address::Unix(path) => Ok(Box::new(UnixStream::connect(path).await?)),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Address::UnixAbstract(name) => {
                use std::os::linux::net::SocketAddrExt;
                let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
                let stream = std::os::unix::net::UnixStream::connect_addr(&addr)?;
                stream.set_nonblocking(true)?;
                Ok(Box::new(UnixStream::from_std(stream)?))
            }
        }
    }

    /// Bind a listener at this address
    pub async fn bind(&self) -> io::Result<Listener> {
        match self {
            Address::Tcp(addr) => Ok(Listener::Tcp(TcpListener::bind(addr.as_str()).await?)),
            #[cfg(unix)]
            Address::Unix(path) => Ok(Listener::Unix(UnixListener::bind(path)?)),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Address::UnixAbstract(name) => {
                use std::os::linux::net::SocketAddrExt;
                let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
                let listener = std::os::unix::net::UnixListener::bind_addr(&addr)?;
                listener.set_nonblocking(true)?;
                Ok(Listener::Unix(UnixListener::from_std(listener)?))
            }
        }
    }
}

/// A bound stream listener for either transport
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    /// Accept one connection
    ///
    /// Returns the boxed stream and a printable peer description for
    /// logging.
    pub async fn accept(&self) -> io::Result<(Box<dyn SessionStream>, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                configure_tcp(&stream);
                Ok((Box::new(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), "unix".to_string()))
            }
        }
    }
}

/// Apply keepalive and nodelay to a freshly established TCP stream
///
/// Best effort: a socket that rejects the options still carries traffic.
fn configure_tcp(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "failed to set TCP_NODELAY");
    }
    let keepalive = TcpKeepalive::new().with_time(TCP_KEEPALIVE_TIME);
    if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        tracing::debug!(error = %e, "failed to set TCP keepalive");
    }
}
