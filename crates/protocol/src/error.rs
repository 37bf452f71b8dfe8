//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding records
///
/// Every variant is a malformed-input condition: the bytes on the wire or
/// on disk do not form a valid record stream. Decoding never partially
/// succeeds; callers discard the connection or segment that produced the
/// error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A length varint ended before its final byte
    #[error("truncated varint in record header")]
    TruncatedVarint,

    /// A length varint continued past the largest encodable u64
    #[error("varint overflows 64 bits")]
    VarintOverflow,

    /// A field length is beyond any plausible record
    #[error("record field of {len} bytes exceeds maximum {max}")]
    FieldTooLarge { len: u64, max: usize },

    /// The input ended inside a record payload
    #[error("truncated record payload: need {need} bytes, have {have}")]
    TruncatedPayload { need: usize, have: usize },
}
