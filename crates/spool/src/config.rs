//! Spool directory layout and suffix scanning

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use crate::{Result, SpoolError};

/// Location of a spool: a directory plus a segment basename
#[derive(Debug, Clone)]
pub struct SpoolConfig {
    /// Directory holding the segment files
    pub directory: PathBuf,

    /// Segment filename prefix; segments are `<basename>_<N>`
    pub basename: String,
}

impl SpoolConfig {
    /// Create a config for `directory` / `basename`
    pub fn new(directory: impl Into<PathBuf>, basename: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            basename: basename.into(),
        }
    }

    /// Path of the segment with the given suffix
    pub fn segment_path(&self, suffix: u64) -> PathBuf {
        self.directory.join(format!("{}_{}", self.basename, suffix))
    }

    /// Scan the directory for segment suffixes, ascending
    ///
    /// Filenames that do not match `<basename>_<decimal>` are ignored;
    /// the spool directory may be shared with unrelated files.
    pub fn scan_suffixes(&self) -> Result<Vec<u64>> {
        let entries = fs::read_dir(&self.directory).map_err(|source| SpoolError::Scan {
            path: self.directory.clone(),
            source,
        })?;

        let mut suffixes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SpoolError::Scan {
                path: self.directory.clone(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(rest) = name.strip_prefix(&self.basename) else {
                continue;
            };
            let Some(digits) = rest.strip_prefix('_') else {
                continue;
            };
            if let Ok(suffix) = digits.parse::<u64>() {
                suffixes.push(suffix);
            }
        }

        suffixes.sort_unstable();
        Ok(suffixes)
    }

    /// The highest existing segment suffix, if any
    pub fn newest_suffix(&self) -> Result<Option<u64>> {
        Ok(self.scan_suffixes()?.last().copied())
    }
}

/// Cached ascending list of segment suffixes for the read side
///
/// The list is repopulated from the directory whenever it runs dry, so
/// segments written while older ones were draining are picked up on the
/// next pass.
#[derive(Debug, Default)]
pub struct FileList {
    suffixes: VecDeque<u64>,
}

impl FileList {
    /// Create an empty list; the first read populates it
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the cached list has been drained
    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }

    /// Remove and return the smallest cached suffix
    pub fn pop_oldest(&mut self) -> Option<u64> {
        self.suffixes.pop_front()
    }

    /// Re-scan the directory and replace the cached list
    pub fn repopulate(&mut self, config: &SpoolConfig) -> Result<()> {
        self.suffixes = config.scan_suffixes()?.into();
        Ok(())
    }
}
