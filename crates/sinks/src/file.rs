//! File processor
//!
//! Formats records through a template and writes them to daily-rotated
//! files. When the configured path contains `${category}`, each category
//! writes to its own expanded path and the processor keeps one
//! `DailyFile` per resolved path; otherwise a single sink is shared.
//!
//! Chains are split at category boundaries before the path is resolved,
//! so each write targets exactly one sink. Records inside a split
//! segment are known to share the head's category and are formatted
//! without re-checking it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parchment_protocol::Chain;
use parking_lot::{Condvar, Mutex};

use crate::{DailyFile, Formatter, Processor, Result, SinkError};

/// Path placeholder replaced by the record category
pub const CATEGORY_TOKEN: &str = "${category}";

enum Target {
    /// Path has no category token: one shared sink
    Single(Arc<DailyFile>),

    /// Path expands per category; `None` after close
    PerCategory {
        template: String,
        files: Mutex<Option<HashMap<String, Arc<DailyFile>>>>,
    },
}

/// Tracks writes in flight so close can wait for them
#[derive(Default)]
struct Inflight {
    count: Mutex<usize>,
    zero: Condvar,
}

impl Inflight {
    fn enter(&self) -> InflightGuard<'_> {
        *self.count.lock() += 1;
        InflightGuard { inflight: self }
    }

    fn wait_zero(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }
}

struct InflightGuard<'a> {
    inflight: &'a Inflight,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.inflight.count.lock();
        *count -= 1;
        if *count == 0 {
            self.inflight.zero.notify_all();
        }
    }
}

/// Processor writing formatted records to daily-rotated files
pub struct FileProcessor {
    formatter: Formatter,
    dir_mode: u32,
    file_mode: u32,
    closed: AtomicBool,
    inflight: Inflight,
    target: Target,
}

impl FileProcessor {
    /// Create a processor for `path` with the given format template
    pub fn new(path: &str, format: &str, dir_mode: u32, file_mode: u32) -> Self {
        let target = if path.contains(CATEGORY_TOKEN) {
            Target::PerCategory {
                template: path.to_string(),
                files: Mutex::new(Some(HashMap::new())),
            }
        } else {
            Target::Single(Arc::new(DailyFile::new(
                Path::new(path),
                dir_mode,
                file_mode,
            )))
        };

        Self {
            formatter: Formatter::new(format),
            dir_mode,
            file_mode,
            closed: AtomicBool::new(false),
            inflight: Inflight::default(),
            target,
        }
    }

    /// Find or create the sink for the head record's category
    fn sink_for(&self, chain: &Chain) -> Result<Arc<DailyFile>> {
        match &self.target {
            Target::Single(sink) => Ok(Arc::clone(sink)),
            Target::PerCategory { template, files } => {
                let category = chain
                    .front()
                    .map(|record| String::from_utf8_lossy(&record.category).into_owned())
                    .unwrap_or_default();
                let resolved = template.replace(CATEGORY_TOKEN, &category);

                let mut guard = files.lock();
                let map = guard.as_mut().ok_or(SinkError::Closed)?;
                Ok(Arc::clone(map.entry(resolved.clone()).or_insert_with(
                    || {
                        Arc::new(DailyFile::new(
                            &PathBuf::from(resolved),
                            self.dir_mode,
                            self.file_mode,
                        ))
                    },
                )))
            }
        }
    }

    /// Format and write one single-category segment, then flush
    fn write_segment(&self, sink: &Arc<DailyFile>, chain: &Chain) -> Result<()> {
        let handle = sink.acquire()?;
        let mut buf = Vec::new();
        for record in chain.iter() {
            buf.clear();
            self.formatter
                .format_into(&mut buf, &record.category, &record.message);
            handle.write_all(&buf).map_err(|source| SinkError::Write {
                path: handle.path().to_path_buf(),
                source,
            })?;
        }
        handle.flush().map_err(|source| SinkError::Flush {
            path: handle.path().to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl Processor for FileProcessor {
    async fn write_chain(&self, chain: Chain) -> Result<()> {
        // guard first: close waits for the gauge after setting the flag,
        // so a write that slipped past the flag still drains before any
        // sink is closed
        let _guard = self.inflight.enter();
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }

        let mut chain = chain;
        while !chain.is_empty() {
            let remainder = chain.split_off_category_change();
            let sink = self.sink_for(&chain)?;
            self.write_segment(&sink, &chain)?;
            chain = remainder;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);

        let sinks: Vec<Arc<DailyFile>> = match &self.target {
            Target::Single(sink) => vec![Arc::clone(sink)],
            Target::PerCategory { files, .. } => match files.lock().take() {
                Some(map) => map.into_values().collect(),
                None => return Ok(()),
            },
        };

        self.inflight.wait_zero();

        let mut first_error = None;
        for sink in sinks {
            if let Err(e) = sink.close() {
                tracing::warn!(error = %e, "failed to close daily sink");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
