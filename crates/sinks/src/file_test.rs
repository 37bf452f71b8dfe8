//! Tests for the file processor

use chrono::Local;
use parchment_protocol::{Chain, Record};
use tempfile::TempDir;

use crate::{FileProcessor, Processor, SinkError};

fn chain_of(pairs: &[(&str, &str)]) -> Chain {
    pairs
        .iter()
        .map(|(c, m)| Record::new(c.as_bytes().to_vec(), m.as_bytes().to_vec()))
        .collect()
}

/// Today's expanded path under `base` for a sink targeting `name`
fn dated(base: &std::path::Path, stem: &str, ext: &str) -> std::path::PathBuf {
    let now = Local::now();
    base.join(now.format("%Y/%m").to_string())
        .join(format!("{}_{}{}", stem, now.format("%Y-%m-%d"), ext))
}

// =============================================================================
// Simple (single-sink) processor
// =============================================================================

#[tokio::test]
async fn test_simple_processor_writes_formatted_records() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("out.log");
    let processor = FileProcessor::new(
        target.to_str().unwrap(),
        "[%category%] %message%",
        0o770,
        0o660,
    );

    processor
        .write_chain(chain_of(&[("app", "hello"), ("app", "world")]))
        .await
        .unwrap();
    processor.close().await.unwrap();

    let path = dated(dir.path(), "out", ".log");
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "[app] hello\n[app] world\n"
    );
}

#[tokio::test]
async fn test_simple_processor_mixed_categories_share_file() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("out.log");
    let processor = FileProcessor::new(target.to_str().unwrap(), "%message%", 0o770, 0o660);

    processor
        .write_chain(chain_of(&[("a", "1"), ("b", "2"), ("a", "3")]))
        .await
        .unwrap();
    processor.close().await.unwrap();

    let path = dated(dir.path(), "out", ".log");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n2\n3\n");
}

// =============================================================================
// Category-expanded processor
// =============================================================================

#[tokio::test]
async fn test_category_expansion_fans_out() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("${category}/out.log");
    let processor = FileProcessor::new(template.to_str().unwrap(), "%message%", 0o770, 0o660);

    processor
        .write_chain(chain_of(&[("a", "1"), ("b", "2"), ("a", "3")]))
        .await
        .unwrap();
    processor.close().await.unwrap();

    let a = dated(&dir.path().join("a"), "out", ".log");
    let b = dated(&dir.path().join("b"), "out", ".log");
    assert_eq!(std::fs::read_to_string(&a).unwrap(), "1\n3\n");
    assert_eq!(std::fs::read_to_string(&b).unwrap(), "2\n");
}

#[tokio::test]
async fn test_same_category_reuses_sink() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("${category}.log");
    let processor = FileProcessor::new(template.to_str().unwrap(), "%message%", 0o770, 0o660);

    processor.write_chain(chain_of(&[("app", "1")])).await.unwrap();
    processor.write_chain(chain_of(&[("app", "2")])).await.unwrap();
    processor.close().await.unwrap();

    let path = dated(dir.path(), "app", ".log");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n2\n");
}

// =============================================================================
// Close semantics
// =============================================================================

#[tokio::test]
async fn test_write_after_close_fails_closed() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("${category}.log");
    let processor = FileProcessor::new(template.to_str().unwrap(), "%message%", 0o770, 0o660);

    processor.close().await.unwrap();

    let result = processor.write_chain(chain_of(&[("a", "1")])).await;
    assert!(matches!(result, Err(SinkError::Closed)));
}

#[tokio::test]
async fn test_double_close_is_ok() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("${category}.log");
    let processor = FileProcessor::new(template.to_str().unwrap(), "%message%", 0o770, 0o660);

    processor.close().await.unwrap();
    processor.close().await.unwrap();
}
