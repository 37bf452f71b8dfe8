//! Stdout processor
//!
//! Debug/foreground output: formats records with the same templates as
//! the file processor and writes them to the process stdout. A chain is
//! rendered into one buffer and written with a single call, so chains
//! from concurrent connections do not interleave mid-record.

use std::io::Write;

use async_trait::async_trait;
use parchment_protocol::Chain;

use crate::{Formatter, Processor, Result, SinkError};

/// Processor writing formatted records to stdout
pub struct StdoutProcessor {
    formatter: Formatter,
}

impl StdoutProcessor {
    /// Create a processor with the given format template
    pub fn new(format: &str) -> Self {
        Self {
            formatter: Formatter::new(format),
        }
    }
}

#[async_trait]
impl Processor for StdoutProcessor {
    async fn write_chain(&self, chain: Chain) -> Result<()> {
        let mut buf = Vec::new();
        for record in chain.iter() {
            self.formatter
                .format_into(&mut buf, &record.category, &record.message);
        }

        let mut out = std::io::stdout().lock();
        out.write_all(&buf).map_err(SinkError::Stdout)?;
        out.flush().map_err(SinkError::Stdout)
    }

    async fn close(&self) -> Result<()> {
        std::io::stdout().lock().flush().map_err(SinkError::Stdout)
    }
}
