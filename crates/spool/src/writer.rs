//! Segment writer
//!
//! Single-owner: only the relay state task writes to a spool, so the
//! writer carries no locking. Segments are created with `O_EXCL` at
//! `max_existing_suffix + 1`, capped at a configured byte budget, and
//! fsynced after every chain so an acknowledged write survives a crash.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use parchment_protocol::{encode_chain, Chain};

use crate::{Result, SpoolConfig, SpoolError, DEFAULT_MAX_SEGMENT_SIZE};

struct Segment {
    file: BufWriter<File>,
    path: PathBuf,
    remaining: i64,
}

/// Appends chains to size-capped segment files
pub struct SpoolWriter {
    config: SpoolConfig,
    max_segment_size: u64,
    segment: Option<Segment>,
}

impl SpoolWriter {
    /// Create a writer; no file is opened until the first write
    pub fn new(config: SpoolConfig, max_segment_size: u64) -> Self {
        let max_segment_size = if max_segment_size == 0 {
            DEFAULT_MAX_SEGMENT_SIZE
        } else {
            max_segment_size
        };
        Self {
            config,
            max_segment_size,
            segment: None,
        }
    }

    /// Append a chain, rolling segments as the size cap is reached
    ///
    /// The chain is split at the open segment's remaining byte budget;
    /// the fitting prefix is encoded into it and the remainder continues
    /// into a fresh segment. Returns only after flush + fsync, so a
    /// successful write is durable.
    pub fn write_chain(&mut self, mut chain: Chain) -> Result<()> {
        while !chain.is_empty() {
            if self.segment.is_none() {
                self.open_segment()?;
            }
            chain = self.write_into_open_segment(chain)?;
        }

        self.sync_segment()?;
        if self
            .segment
            .as_ref()
            .is_some_and(|segment| segment.remaining <= 0)
        {
            self.segment = None;
        }
        Ok(())
    }

    /// Write as much of `chain` as the open segment's budget allows
    ///
    /// Returns the records that did not fit; a non-empty remainder means
    /// the segment was sealed and the caller should open the next one.
    /// With no segment open the chain comes back untouched.
    fn write_into_open_segment(&mut self, mut chain: Chain) -> Result<Chain> {
        let Some(segment) = self.segment.as_mut() else {
            return Ok(chain);
        };

        let budget = segment.remaining.max(1) as usize;
        let remainder = chain.split_off_over_budget(budget);

        let mut buf = Vec::with_capacity(chain.encoded_len());
        encode_chain(&mut buf, &chain);
        segment.file.write_all(&buf).map_err(|source| SpoolError::Write {
            path: segment.path.clone(),
            source,
        })?;
        segment.remaining -= buf.len() as i64;

        if !remainder.is_empty() {
            // budget exhausted: seal this segment before the next opens
            self.sync_segment()?;
            self.segment = None;
        }
        Ok(remainder)
    }

    /// Flush and close any open segment
    pub fn close(&mut self) -> Result<()> {
        self.sync_segment()?;
        self.segment = None;
        Ok(())
    }

    fn open_segment(&mut self) -> Result<()> {
        let next = self.config.newest_suffix()?.map_or(0, |s| s + 1);
        let path = self.config.segment_path(next);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| SpoolError::Create {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), "opened spool segment");
        self.segment = Some(Segment {
            file: BufWriter::new(file),
            path,
            remaining: self.max_segment_size as i64,
        });
        Ok(())
    }

    fn sync_segment(&mut self) -> Result<()> {
        let Some(segment) = self.segment.as_mut() else {
            return Ok(());
        };
        segment.file.flush().map_err(|source| SpoolError::Sync {
            path: segment.path.clone(),
            source,
        })?;
        segment
            .file
            .get_ref()
            .sync_all()
            .map_err(|source| SpoolError::Sync {
                path: segment.path.clone(),
                source,
            })
    }
}
