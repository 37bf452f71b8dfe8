//! Tests for the record codec

use crate::codec::{put_varint, take_varint};
use crate::{
    decode_chain, decode_record, encode_chain, encode_record, varint_len, Chain, ProtocolError,
    Record,
};

fn rec(category: &str, message: &str) -> Record {
    Record::new(category.as_bytes().to_vec(), message.as_bytes().to_vec())
}

// =============================================================================
// Varint encoding
// =============================================================================

#[test]
fn test_varint_round_trip() {
    let values = [0u64, 1, 127, 128, 300, 16383, 16384, u32::MAX as u64, u64::MAX];
    for value in values {
        let mut buf = Vec::new();
        put_varint(&mut buf, value);
        assert_eq!(buf.len(), varint_len(value), "length for {value}");

        let mut input = buf.as_slice();
        assert_eq!(take_varint(&mut input).unwrap(), value);
        assert!(input.is_empty());
    }
}

#[test]
fn test_varint_truncated() {
    // Continuation bit set with nothing following
    let mut input: &[u8] = &[0x80];
    assert!(matches!(
        take_varint(&mut input),
        Err(ProtocolError::TruncatedVarint)
    ));
}

#[test]
fn test_varint_overflow() {
    // Eleven continuation bytes cannot fit in 64 bits
    let mut input: &[u8] = &[0xff; 11];
    assert!(matches!(
        take_varint(&mut input),
        Err(ProtocolError::VarintOverflow)
    ));
}

// =============================================================================
// Record round trips
// =============================================================================

#[test]
fn test_record_round_trip() {
    let record = rec("app", "hello world");
    let mut buf = Vec::new();
    encode_record(&mut buf, &record);
    assert_eq!(buf.len(), record.encoded_len());

    let mut input = buf.as_slice();
    let decoded = decode_record(&mut input).unwrap().unwrap();
    assert_eq!(decoded, record);
    assert!(input.is_empty());
}

#[test]
fn test_record_with_empty_fields() {
    let record = rec("", "");
    let mut buf = Vec::new();
    encode_record(&mut buf, &record);
    assert_eq!(buf, vec![0, 0]);

    let decoded = decode_chain(&buf).unwrap();
    assert_eq!(decoded.len(), 1);
}

#[test]
fn test_record_binary_payload() {
    let record = Record::new(vec![0u8, 1, 255], vec![0xde, 0xad, 0xbe, 0xef]);
    let mut buf = Vec::new();
    encode_record(&mut buf, &record);

    let mut input = buf.as_slice();
    let decoded = decode_record(&mut input).unwrap().unwrap();
    assert_eq!(decoded, record);
}

#[test]
fn test_decode_empty_input_is_clean_end() {
    let mut input: &[u8] = &[];
    assert!(decode_record(&mut input).unwrap().is_none());
}

#[test]
fn test_decode_truncated_payload() {
    let mut buf = Vec::new();
    encode_record(&mut buf, &rec("app", "hello"));
    buf.truncate(buf.len() - 2);

    let mut input = buf.as_slice();
    assert!(matches!(
        decode_record(&mut input),
        Err(ProtocolError::TruncatedPayload { .. })
    ));
}

#[test]
fn test_decode_implausible_length() {
    // Category length claims 1 GiB
    let mut buf = Vec::new();
    put_varint(&mut buf, 1 << 30);

    let mut input = buf.as_slice();
    assert!(matches!(
        decode_record(&mut input),
        Err(ProtocolError::FieldTooLarge { .. })
    ));
}

// =============================================================================
// Chain round trips
// =============================================================================

#[test]
fn test_chain_round_trip() {
    let chain: Chain = [
        rec("app", "hello"),
        rec("db", "query took 4ms"),
        rec("app", "world"),
    ]
    .into_iter()
    .collect();

    let mut buf = Vec::new();
    encode_chain(&mut buf, &chain);
    assert_eq!(buf.len(), chain.encoded_len());

    let decoded = decode_chain(&buf).unwrap();
    assert_eq!(decoded, chain);
}

#[test]
fn test_empty_chain_encodes_to_nothing() {
    let mut buf = Vec::new();
    encode_chain(&mut buf, &Chain::new());
    assert!(buf.is_empty());
    assert!(decode_chain(&buf).unwrap().is_empty());
}

#[test]
fn test_decode_rejects_partial_trailing_record() {
    let mut buf = Vec::new();
    encode_chain(
        &mut buf,
        &[rec("a", "1"), rec("b", "2")].into_iter().collect(),
    );
    buf.pop();

    assert!(decode_chain(&buf).is_err());
}
