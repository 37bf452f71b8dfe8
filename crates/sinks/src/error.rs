//! Sink error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in output processors
#[derive(Debug, Error)]
pub enum SinkError {
    /// Write attempted after `close`
    #[error("processor is closed")]
    Closed,

    /// Failed to create a sink directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to open a sink file
    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write log data to a sink file
    #[error("failed to write log data to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to flush a sink file
    #[error("failed to flush '{path}': {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to stdout
    #[error("failed to write to stdout: {0}")]
    Stdout(#[source] io::Error),

    /// The relay's disk spool failed
    ///
    /// Latched by the relay state machine: once set, every subsequent
    /// `write_chain` and the final `close` report it. The message is the
    /// rendered spool error so the latch stays cheaply clonable.
    #[error("spool failure: {0}")]
    SpoolFailed(String),
}
