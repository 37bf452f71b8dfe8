//! Parchment Net - Framed, acknowledged wire sessions
//!
//! Both halves of the parchment wire protocol: the client session used by
//! producers and the relay processor, and the server session used by
//! router inputs. Sessions run over TCP or UNIX stream sockets behind a
//! boxed stream, so both transports share one code path.
//!
//! # Protocol
//!
//! Four framed commands, all integers little-endian:
//!
//! ```text
//! 0x01 CONNECT      u32 magic, u32 version
//! 0x02 CONNECT_ACK  u32 magic, u32 version
//! 0x03 CHAIN        u32 count, then `count` encoded records
//! 0x04 CHAIN_ACK    u32 count
//! ```
//!
//! A session begins with CONNECT / CONNECT_ACK; any magic or version
//! mismatch fails the handshake. Every CHAIN must be acknowledged with a
//! CHAIN_ACK carrying the same record count before the sender may
//! continue. The receiver acknowledges only after the chain has been
//! durably accepted downstream, which is what gives the system its
//! at-least-once guarantee.
//!
//! # Failure model
//!
//! Any framing, handshake or I/O error is fatal to the session: the
//! connection is dropped and the peer reconnects. There are no partial
//! retries within a session.

mod addr;
mod error;
mod session;

pub use addr::{Address, AddrParseError, Listener};
pub use error::NetError;
pub use session::{ServerSession, Session, SessionStream};

/// Protocol identification constant ("PCHT" on the wire)
pub const MAGIC: u32 = 0x5448_4350;

/// Protocol version; bumped on any incompatible frame change
pub const VERSION: u32 = 1;

/// Command bytes for the framed protocol
pub(crate) mod cmd {
    pub const CONNECT: u8 = 0x01;
    pub const CONNECT_ACK: u8 = 0x02;
    pub const CHAIN: u8 = 0x03;
    pub const CHAIN_ACK: u8 = 0x04;
}

/// Result type for wire operations
pub type Result<T> = std::result::Result<T, NetError>;
