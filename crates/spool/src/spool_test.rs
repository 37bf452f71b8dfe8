//! Tests for the disk spool

use parchment_protocol::{Chain, Record};
use tempfile::TempDir;

use crate::{load_oldest, FileList, SpoolConfig, SpoolWriter};

fn rec(category: &str, message: &str) -> Record {
    Record::new(category.as_bytes().to_vec(), message.as_bytes().to_vec())
}

fn chain_of(pairs: &[(&str, &str)]) -> Chain {
    pairs.iter().map(|(c, m)| rec(c, m)).collect()
}

fn test_config(dir: &TempDir) -> SpoolConfig {
    SpoolConfig::new(dir.path(), "relay")
}

// =============================================================================
// Suffix scanning
// =============================================================================

#[test]
fn test_scan_ignores_unrelated_files() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    std::fs::write(dir.path().join("relay_3"), b"").unwrap();
    std::fs::write(dir.path().join("relay_11"), b"").unwrap();
    std::fs::write(dir.path().join("relay_abc"), b"").unwrap();
    std::fs::write(dir.path().join("other_1"), b"").unwrap();
    std::fs::write(dir.path().join("relay"), b"").unwrap();

    assert_eq!(config.scan_suffixes().unwrap(), vec![3, 11]);
    assert_eq!(config.newest_suffix().unwrap(), Some(11));
}

#[test]
fn test_scan_empty_directory() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    assert!(config.scan_suffixes().unwrap().is_empty());
    assert_eq!(config.newest_suffix().unwrap(), None);
}

#[test]
fn test_suffixes_sort_numerically_not_lexically() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    for suffix in [2u64, 10, 1] {
        std::fs::write(config.segment_path(suffix), b"").unwrap();
    }

    assert_eq!(config.scan_suffixes().unwrap(), vec![1, 2, 10]);
}

// =============================================================================
// Writing
// =============================================================================

#[test]
fn test_write_creates_segment_after_newest() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    std::fs::write(config.segment_path(7), b"").unwrap();

    let mut writer = SpoolWriter::new(config.clone(), 0);
    writer.write_chain(chain_of(&[("app", "hello")])).unwrap();

    assert!(config.segment_path(8).exists());
}

#[test]
fn test_write_round_trips_through_reader() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let chain = chain_of(&[("app", "hello"), ("db", "world")]);

    let mut writer = SpoolWriter::new(config.clone(), 0);
    writer.write_chain(chain.clone()).unwrap();
    writer.close().unwrap();

    let mut list = FileList::new();
    let loaded = load_oldest(&config, &mut list).unwrap().expect("a segment");
    assert_eq!(loaded.chain, chain);
}

#[test]
fn test_segment_rolls_when_budget_exceeded() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    // Tiny cap: every record (4 encoded bytes) overflows it
    let mut writer = SpoolWriter::new(config.clone(), 4);
    writer
        .write_chain(chain_of(&[("a", "1"), ("a", "2"), ("a", "3")]))
        .unwrap();

    let suffixes = config.scan_suffixes().unwrap();
    assert_eq!(suffixes.len(), 3, "one segment per record at this cap");
}

#[test]
fn test_oversized_first_record_still_written() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let mut writer = SpoolWriter::new(config.clone(), 2);
    writer
        .write_chain(chain_of(&[("category", "much longer than two bytes")]))
        .unwrap();

    let mut list = FileList::new();
    let loaded = load_oldest(&config, &mut list).unwrap().expect("a segment");
    assert_eq!(loaded.chain.len(), 1);
}

#[test]
fn test_writes_append_across_calls_within_budget() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let mut writer = SpoolWriter::new(config.clone(), 0);
    writer.write_chain(chain_of(&[("a", "1")])).unwrap();
    writer.write_chain(chain_of(&[("a", "2")])).unwrap();
    writer.close().unwrap();

    assert_eq!(config.scan_suffixes().unwrap().len(), 1);

    let mut list = FileList::new();
    let loaded = load_oldest(&config, &mut list).unwrap().expect("a segment");
    assert_eq!(loaded.chain.len(), 2);
}

// =============================================================================
// Reading and deletion
// =============================================================================

#[test]
fn test_segments_drain_oldest_first() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    for (suffix, message) in [(1u64, "first"), (2, "second"), (3, "third")] {
        let mut buf = Vec::new();
        parchment_protocol::encode_chain(&mut buf, &chain_of(&[("app", message)]));
        std::fs::write(config.segment_path(suffix), &buf).unwrap();
    }

    let mut list = FileList::new();
    let mut seen = Vec::new();
    while let Some(loaded) = load_oldest(&config, &mut list).unwrap() {
        seen.push(String::from_utf8_lossy(&loaded.chain.front().unwrap().message).into_owned());
        loaded.delete().unwrap();
    }

    assert_eq!(seen, vec!["first", "second", "third"]);
    assert!(config.scan_suffixes().unwrap().is_empty());
}

#[test]
fn test_empty_segments_are_deleted_and_skipped() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    std::fs::write(config.segment_path(1), b"").unwrap();
    let mut buf = Vec::new();
    parchment_protocol::encode_chain(&mut buf, &chain_of(&[("app", "real")]));
    std::fs::write(config.segment_path(2), &buf).unwrap();

    let mut list = FileList::new();
    let loaded = load_oldest(&config, &mut list).unwrap().expect("a segment");
    assert_eq!(loaded.path(), config.segment_path(2));
    assert!(!config.segment_path(1).exists(), "empty segment removed");
}

#[test]
fn test_reader_finds_segments_written_after_drain() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let mut list = FileList::new();

    assert!(load_oldest(&config, &mut list).unwrap().is_none());

    let mut writer = SpoolWriter::new(config.clone(), 0);
    writer.write_chain(chain_of(&[("app", "late")])).unwrap();
    writer.close().unwrap();

    assert!(load_oldest(&config, &mut list).unwrap().is_some());
}

#[test]
fn test_corrupt_segment_reports_decode_error() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    // A truncated record: claims 100 category bytes, provides none
    std::fs::write(config.segment_path(1), [100u8]).unwrap();

    let mut list = FileList::new();
    assert!(matches!(
        load_oldest(&config, &mut list),
        Err(crate::SpoolError::Decode { .. })
    ));
}
