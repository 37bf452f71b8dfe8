//! Segment reader
//!
//! Reads segments oldest-first. A loaded segment is not deleted until
//! the caller has pushed its chain downstream and received an
//! acknowledgement; the `SpoolChain` it gets back is the
//! delete-on-commit token.

use std::fs;
use std::path::PathBuf;

use parchment_protocol::{decode_chain, Chain};

use crate::{FileList, Result, SpoolConfig, SpoolError};

/// A chain loaded from one spool segment
///
/// Holds the segment path so the segment can be deleted once the chain
/// has been acknowledged downstream.
#[derive(Debug)]
pub struct SpoolChain {
    /// The decoded records
    pub chain: Chain,
    path: PathBuf,
}

impl SpoolChain {
    /// Path of the segment this chain was loaded from
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Delete the backing segment
    ///
    /// Call only after the chain has been durably accepted downstream.
    pub fn delete(self) -> Result<()> {
        fs::remove_file(&self.path).map_err(|source| SpoolError::Delete {
            path: self.path.clone(),
            source,
        })
    }
}

/// Load the oldest non-empty segment as a chain
///
/// The cached file list is repopulated from the directory whenever it
/// runs dry, so segments written during a long drain are found. Empty
/// segments are deleted on the spot and skipped. Returns `Ok(None)` when
/// no segments remain.
pub fn load_oldest(config: &SpoolConfig, list: &mut FileList) -> Result<Option<SpoolChain>> {
    loop {
        if list.is_empty() {
            list.repopulate(config)?;
        }
        let Some(suffix) = list.pop_oldest() else {
            return Ok(None);
        };

        let path = config.segment_path(suffix);
        let data = fs::read(&path).map_err(|source| SpoolError::Read {
            path: path.clone(),
            source,
        })?;
        let chain = decode_chain(&data).map_err(|source| SpoolError::Decode {
            path: path.clone(),
            source,
        })?;

        if chain.is_empty() {
            // stale empty segment: remove and keep scanning
            fs::remove_file(&path).map_err(|source| SpoolError::Delete {
                path: path.clone(),
                source,
            })?;
            continue;
        }

        return Ok(Some(SpoolChain { chain, path }));
    }
}
