//! Parchment Spool - Append-only segmented disk buffer
//!
//! The spool absorbs records while an upstream is unreachable. It is a
//! directory of segment files named `<basename>_<N>` where `N` is a
//! monotonically increasing decimal suffix:
//!
//! ```text
//! /var/spool/parchment/relay_17
//! /var/spool/parchment/relay_18
//! /var/spool/parchment/relay_19   <- currently open for writes
//! ```
//!
//! Segment content is the wire record encoding, so a drained segment can
//! be replayed to the upstream verbatim. Suffix order is creation order
//! is drain order; segments are deleted only after the chain read from
//! them has been acknowledged downstream, and strictly oldest-first.
//!
//! # Durability
//!
//! Every `write_chain` ends with a flush and an fsync before reporting
//! success. A crash can therefore duplicate records (the upstream may
//! have seen them before the segment was deleted) but never lose them.

mod config;
mod error;
mod reader;
mod writer;

pub use config::{FileList, SpoolConfig};
pub use error::SpoolError;
pub use reader::{load_oldest, SpoolChain};
pub use writer::SpoolWriter;

/// Default maximum size of one segment (100 MiB)
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 100 * 1024 * 1024;

/// Result type for spool operations
pub type Result<T> = std::result::Result<T, SpoolError>;

// Test modules - only compiled during testing
#[cfg(test)]
mod spool_test;
