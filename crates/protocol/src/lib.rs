//! Parchment Protocol - Core types for the parchment log router
//!
//! This crate provides the foundational types that flow through the router:
//! - `Record` - A single `(category, message)` pair
//! - `Chain` - An ordered sequence of records forming one transmission unit
//! - The length-prefixed record codec shared by the wire protocol and the
//!   disk spool
//!
//! # Design Principles
//!
//! - **Cheap ownership transfer**: Record fields are `bytes::Bytes`, so
//!   cloning a record for a retry is a refcount bump, not a copy.
//! - **Owned chains**: Chains are owned segments with O(1) amortised
//!   concatenation. Splitting a chain produces another owned chain; no
//!   intrusive links cross any public boundary.
//! - **One encoding everywhere**: The record encoding is identical on the
//!   wire and on disk, so spooled segments can be replayed verbatim.
//!
//! # Encoding
//!
//! ```text
//! varuint(len(category)) || varuint(len(message)) || category || message
//! ```
//!
//! Lengths are unsigned LEB128 (7 data bits per byte, MSB = continuation).
//! A chain is encoded as the concatenation of its records with no framing
//! between them.

mod codec;
mod error;
mod record;

pub use codec::{
    decode_chain, decode_record, encode_chain, encode_record, varint_len, MAX_FIELD_LEN,
};
pub use error::ProtocolError;
pub use record::{Chain, Record};

// Re-export bytes for convenience
pub use bytes::Bytes;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Test modules - only compiled during testing
#[cfg(test)]
mod codec_test;
