//! Spool error types

use std::io;
use std::path::PathBuf;

use parchment_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur on the disk spool
///
/// Spool errors are fatal to the relay processor that owns the spool:
/// once one occurs, the processor latches it and stops accepting
/// records.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// Failed to list the spool directory
    #[error("failed to read spool directory '{path}': {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a new segment file
    #[error("failed to create spool segment '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to the open segment
    #[error("failed to write spool segment '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to flush or sync the open segment
    #[error("failed to sync spool segment '{path}': {source}")]
    Sync {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read a segment back
    #[error("failed to read spool segment '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A segment's content failed to decode
    #[error("corrupt spool segment '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: ProtocolError,
    },

    /// Failed to delete a drained or empty segment
    #[error("failed to delete spool segment '{path}': {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
