//! Length-prefixed record codec
//!
//! Records are encoded as two LEB128 varints (category length, message
//! length) followed by the raw bytes of both fields. The encoding is used
//! verbatim on the wire (inside CHAIN frames) and in spool segments.
//!
//! Decoding is slice-based: spool segments are read whole and decoded in
//! place; the wire session decodes from its buffered reader with the same
//! limits.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::record::{Chain, Record};
use crate::Result;

/// Upper bound on a single category or message field (16 MiB)
///
/// Anything larger is treated as a corrupt length prefix rather than a
/// legitimate record.
pub const MAX_FIELD_LEN: usize = 16 * 1024 * 1024;

/// Number of bytes `put_varint` will write for `value`
#[inline]
pub fn varint_len(value: u64) -> usize {
    // 7 data bits per byte; zero still takes one byte
    (64 - (value | 1).leading_zeros() as usize).div_ceil(7)
}

/// Append `value` as an unsigned LEB128 varint
pub(crate) fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Consume an unsigned LEB128 varint from the front of `input`
pub(crate) fn take_varint(input: &mut &[u8]) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (index, &byte) in input.iter().enumerate() {
        if shift >= 64 {
            return Err(ProtocolError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            *input = &input[index + 1..];
            return Ok(value);
        }
        shift += 7;
    }
    Err(ProtocolError::TruncatedVarint)
}

/// Append the encoding of one record
pub fn encode_record(buf: &mut Vec<u8>, record: &Record) {
    put_varint(buf, record.category.len() as u64);
    put_varint(buf, record.message.len() as u64);
    buf.extend_from_slice(&record.category);
    buf.extend_from_slice(&record.message);
}

/// Append the encoding of every record in a chain
pub fn encode_chain(buf: &mut Vec<u8>, chain: &Chain) {
    buf.reserve(chain.encoded_len());
    for record in chain.iter() {
        encode_record(buf, record);
    }
}

fn take_field(input: &mut &[u8]) -> Result<Bytes> {
    let len = take_varint(input)?;
    if len > MAX_FIELD_LEN as u64 {
        return Err(ProtocolError::FieldTooLarge {
            len,
            max: MAX_FIELD_LEN,
        });
    }
    let len = len as usize;
    if input.len() < len {
        return Err(ProtocolError::TruncatedPayload {
            need: len,
            have: input.len(),
        });
    }
    let field = Bytes::copy_from_slice(&input[..len]);
    *input = &input[len..];
    Ok(field)
}

/// Decode one record from the front of `input`
///
/// Returns `Ok(None)` when the input is empty (a clean end of stream).
/// Any partial record is an error: segments and frames never end inside
/// a record.
pub fn decode_record(input: &mut &[u8]) -> Result<Option<Record>> {
    if input.is_empty() {
        return Ok(None);
    }
    let category = take_field(input)?;
    let message = take_field(input)?;
    Ok(Some(Record { category, message }))
}

/// Decode an entire buffer of concatenated records into a chain
pub fn decode_chain(mut input: &[u8]) -> Result<Chain> {
    let mut chain = Chain::new();
    while let Some(record) = decode_record(&mut input)? {
        chain.push(record);
    }
    Ok(chain)
}
