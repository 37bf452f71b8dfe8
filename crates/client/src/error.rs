//! Client error types

use parchment_net::AddrParseError;
use thiserror::Error;

/// Errors from the producer-side writer
#[derive(Debug, Error)]
pub enum ClientError {
    /// The remote address failed to parse
    #[error("invalid remote address: {0}")]
    Address(#[from] AddrParseError),

    /// `add_message` after `close`
    #[error("writer is closed")]
    Closed,
}
