//! Configuration error types

use std::io;

use thiserror::Error;

/// Errors that can occur when loading or validating configuration
///
/// At startup any of these aborts the process; on reload they are
/// logged and the previous configuration stays active.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Input or relay address failed to parse
    #[error("invalid address: {0}")]
    Address(#[from] parchment_net::AddrParseError),

    /// Output pattern is not a valid regex
    #[error("failed to compile output pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// More than one output has an empty pattern
    #[error("multiple default outputs (empty pattern); at most one is allowed")]
    DuplicateDefault,

    /// A required per-type field is missing
    #[error("{kind} output is missing required field '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// A file mode string failed to parse
    #[error("invalid file mode '{value}'")]
    InvalidMode { value: String },
}
