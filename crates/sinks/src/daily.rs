//! Daily rotating sink file
//!
//! One `DailyFile` owns one logical output path and rotates the backing
//! file at each local midnight, expanding the path with the date:
//!
//! ```text
//! /var/log/app/out.log  ->  /var/log/app/2024/06/out_2024-06-30.log
//! ```
//!
//! # Concurrency
//!
//! Callers acquire an RAII handle before writing. Rotation waits until
//! every outstanding handle has been dropped, so the current file is
//! never closed under a writer. Handle writes serialise on an internal
//! mutex, making concurrent holders safe. The first acquire after
//! midnight performs the rotation.

use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Days, Local, NaiveTime};
use parking_lot::{Condvar, Mutex};

use crate::{Result, SinkError};

/// The buffered file currently backing a `DailyFile`
struct SharedWriter {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
}

struct DailyState {
    next_rotation: Option<DateTime<Local>>,
    writer: Option<Arc<SharedWriter>>,
    inflight: usize,
}

/// A per-path sink file rotated at each local midnight
pub struct DailyFile {
    state: Mutex<DailyState>,
    drained: Condvar,

    // immutable layout
    directory: PathBuf,
    basename: String,
    extension: String,
    dir_mode: u32,
    file_mode: u32,
}

impl DailyFile {
    /// Create a sink for `target`, e.g. `/var/log/app/out.log`
    ///
    /// The target's directory, stem and extension become the rotation
    /// template; no file is opened until the first acquire.
    pub fn new(target: &Path, dir_mode: u32, file_mode: u32) -> Self {
        let directory = target.parent().unwrap_or(Path::new(".")).to_path_buf();
        let basename = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = target
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        Self {
            state: Mutex::new(DailyState {
                next_rotation: None,
                writer: None,
                inflight: 0,
            }),
            drained: Condvar::new(),
            directory,
            basename,
            extension,
            dir_mode,
            file_mode,
        }
    }

    /// Acquire a writer handle, rotating first if midnight has passed
    pub fn acquire(self: &Arc<Self>) -> Result<DailyHandle> {
        self.acquire_at(Local::now())
    }

    /// Acquire a writer handle as of `now`
    ///
    /// Separated from `acquire` so rotation can be driven with injected
    /// times in tests.
    pub fn acquire_at(self: &Arc<Self>, now: DateTime<Local>) -> Result<DailyHandle> {
        let mut state = self.state.lock();

        let due = state.writer.is_none()
            || state.next_rotation.map_or(true, |rotation| now >= rotation);
        if due {
            while state.inflight > 0 {
                self.drained.wait(&mut state);
            }
            if let Some(old) = state.writer.take() {
                if let Err(e) = old.file.lock().flush() {
                    tracing::warn!(path = %old.path.display(), error = %e, "failed to flush rotated file");
                }
            }

            let directory = self.directory.join(now.format("%Y/%m").to_string());
            make_dirs(&directory, self.dir_mode).map_err(|source| SinkError::CreateDir {
                path: directory.clone(),
                source,
            })?;

            let filename = format!(
                "{}_{}{}",
                self.basename,
                now.format("%Y-%m-%d"),
                self.extension
            );
            let path = directory.join(filename);
            tracing::info!(path = %path.display(), "opening daily sink file");
            let file = open_append(&path, self.file_mode).map_err(|source| SinkError::Open {
                path: path.clone(),
                source,
            })?;

            state.writer = Some(Arc::new(SharedWriter {
                file: Mutex::new(BufWriter::new(file)),
                path,
            }));
            state.next_rotation = Some(next_midnight(now));
        }

        let writer = state.writer.clone().ok_or(SinkError::Closed)?;
        state.inflight += 1;
        Ok(DailyHandle {
            writer,
            owner: Arc::clone(self),
        })
    }

    /// Flush and close the current file
    ///
    /// Waits for outstanding handles to drain first. Idempotent: a
    /// closed sink reopens on the next acquire, so callers that must
    /// reject late writes gate them before reaching the sink.
    pub fn close(&self) -> Result<()> {
        let writer = {
            let mut state = self.state.lock();
            while state.inflight > 0 {
                self.drained.wait(&mut state);
            }
            state.writer.take()
        };

        if let Some(writer) = writer {
            writer.file.lock().flush().map_err(|source| SinkError::Flush {
                path: writer.path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// RAII writer handle; dropping it releases the inflight count
pub struct DailyHandle {
    writer: Arc<SharedWriter>,
    owner: Arc<DailyFile>,
}

impl DailyHandle {
    /// Write bytes through the shared buffered writer
    pub fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        self.writer.file.lock().write_all(buf)
    }

    /// Flush the shared buffered writer
    pub fn flush(&self) -> io::Result<()> {
        self.writer.file.lock().flush()
    }

    /// Path of the file this handle writes to
    pub fn path(&self) -> &Path {
        &self.writer.path
    }
}

impl Drop for DailyHandle {
    fn drop(&mut self) {
        let mut state = self.owner.state.lock();
        state.inflight -= 1;
        if state.inflight == 0 {
            self.owner.drained.notify_all();
        }
    }
}

/// The next local midnight strictly after `now`
fn next_midnight(now: DateTime<Local>) -> DateTime<Local> {
    let tomorrow = now.date_naive() + Days::new(1);
    tomorrow
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        // midnight skipped by a DST transition: fall back to a flat day
        .unwrap_or_else(|| now + chrono::Duration::hours(24))
}

#[cfg(unix)]
fn make_dirs(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    DirBuilder::new().recursive(true).mode(mode).create(path)
}

#[cfg(not(unix))]
fn make_dirs(path: &Path, _mode: u32) -> io::Result<()> {
    DirBuilder::new().recursive(true).create(path)
}

#[cfg(unix)]
fn open_append(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .append(true)
        .create(true)
        .mode(mode)
        .open(path)
}

#[cfg(not(unix))]
fn open_append(path: &Path, _mode: u32) -> io::Result<File> {
    OpenOptions::new().append(true).create(true).open(path)
}
