//! Wire session error types

use std::io;

use parchment_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur on a wire session
///
/// Every variant poisons the session it occurred on; the caller closes
/// the connection and, if it is the retrying side, reconnects.
#[derive(Debug, Error)]
pub enum NetError {
    /// Failed to reach the remote endpoint
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// I/O error on an established session
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A deadline elapsed before the operation completed
    #[error("operation timed out")]
    Timeout,

    /// Handshake carried the wrong magic or version
    #[error("corrupt handshake: magic {magic:#010x}, version {version}")]
    Handshake { magic: u32, version: u32 },

    /// A frame began with an unexpected command byte
    #[error("unexpected command {got:#04x} (expected {expected:#04x})")]
    UnexpectedCommand { expected: u8, got: u8 },

    /// CHAIN_ACK count does not match what was sent
    ///
    /// The session state is unknowable after this; there are no partial
    /// retries, so the sender reconnects and resends the whole chain.
    #[error("acknowledged {got} records, sent {expected}")]
    AckMismatch { expected: u32, got: u32 },

    /// Record data inside a CHAIN frame failed to decode
    #[error("malformed record data: {0}")]
    Malformed(#[from] ProtocolError),
}
