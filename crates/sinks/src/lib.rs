//! Parchment Sinks - Output processors
//!
//! A processor is the capability the router dispatches chains into:
//! something that accepts a chain, commits it somewhere, and can be
//! closed. Three variants exist:
//!
//! | Processor | Destination | Survives outages |
//! |-----------|-------------|------------------|
//! | `StdoutProcessor` | process stdout | n/a |
//! | `FileProcessor` | daily-rotated files, optionally per category | n/a |
//! | `RelayProcessor` | upstream parchment router | via disk spool |
//!
//! # Ownership
//!
//! A chain passed to `write_chain` is owned by the processor from that
//! point on. File and stdout processors commit it before returning; the
//! relay processor queues it and commits asynchronously, which is why
//! its spool failure surfaces on later calls and on `close`.

mod daily;
mod error;
mod file;
mod format;
mod relay;
mod stdout;

use async_trait::async_trait;
use parchment_protocol::Chain;

pub use daily::{DailyFile, DailyHandle};
pub use error::SinkError;
pub use file::{FileProcessor, CATEGORY_TOKEN};
pub use format::Formatter;
pub use relay::{RelayConfig, RelayProcessor};
pub use stdout::StdoutProcessor;

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;

/// A sink capability accepting chains
///
/// `write_chain` transfers ownership of the chain. `close` is
/// cooperative: it waits for in-flight work to drain and reports any
/// failure that was latched while the processor ran.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Commit a chain to this processor's destination
    async fn write_chain(&self, chain: Chain) -> Result<()>;

    /// Flush, stop accepting writes, and release resources
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod file_test;
