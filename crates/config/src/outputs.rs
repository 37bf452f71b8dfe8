//! Output (processor) configuration

use std::path::PathBuf;
use std::str::FromStr;

use parchment_net::Address;
use serde::Deserialize;

use crate::{parse_mode, ConfigError, Result, DEFAULT_FORMAT};

/// Output processor kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Format records to the router's stdout
    Stdout,

    /// Daily-rotated files, optionally expanded per category
    File,

    /// Forward to an upstream router through a disk spool
    Relay,
}

impl OutputKind {
    fn name(self) -> &'static str {
        match self {
            OutputKind::Stdout => "stdout",
            OutputKind::File => "file",
            OutputKind::Relay => "relay",
        }
    }
}

/// One output rule: a category pattern and a processor definition
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Category regex; empty marks the default rule
    #[serde(default)]
    pub pattern: String,

    /// Processor kind
    #[serde(rename = "type")]
    pub kind: OutputKind,

    /// Record format template (stdout and file)
    #[serde(default)]
    pub format: Option<String>,

    /// Target path, may contain `${category}` (file only)
    #[serde(default)]
    pub path: Option<String>,

    /// Mode for created directories (file only)
    #[serde(default)]
    pub directorymode: Option<String>,

    /// Mode for created files (file only)
    #[serde(default)]
    pub filemode: Option<String>,

    /// Upstream address (relay only)
    #[serde(default)]
    pub remote: Option<String>,

    /// Spool directory (relay only)
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,

    /// Spool segment basename; defaults to "spool" (relay only)
    #[serde(default)]
    pub spool_basename: Option<String>,

    /// Spool segment size cap in bytes; 0 selects the default (relay only)
    #[serde(default)]
    pub spool_max_bytes: u64,
}

impl OutputConfig {
    /// Check the pattern, per-kind required fields, and mode strings
    pub fn validate(&self) -> Result<()> {
        if !self.pattern.is_empty() {
            regex::bytes::Regex::new(&self.pattern).map_err(|source| ConfigError::Pattern {
                pattern: self.pattern.clone(),
                source,
            })?;
        }

        match self.kind {
            OutputKind::Stdout => {}
            OutputKind::File => {
                if self.path.as_deref().unwrap_or("").is_empty() {
                    return Err(ConfigError::MissingField {
                        kind: self.kind.name(),
                        field: "path",
                    });
                }
            }
            OutputKind::Relay => {
                match &self.remote {
                    Some(remote) => {
                        Address::from_str(remote)?;
                    }
                    None => {
                        return Err(ConfigError::MissingField {
                            kind: self.kind.name(),
                            field: "remote",
                        })
                    }
                }
                if self.spool_dir.is_none() {
                    return Err(ConfigError::MissingField {
                        kind: self.kind.name(),
                        field: "spool_dir",
                    });
                }
            }
        }

        if let Some(mode) = &self.directorymode {
            parse_mode(mode)?;
        }
        if let Some(mode) = &self.filemode {
            parse_mode(mode)?;
        }
        Ok(())
    }

    /// The format template, or the built-in default
    pub fn format(&self) -> &str {
        self.format.as_deref().unwrap_or(DEFAULT_FORMAT)
    }

    /// Directory mode with the 0770 default applied
    pub fn directory_mode(&self) -> Result<u32> {
        self.directorymode.as_deref().map_or(Ok(0o770), parse_mode)
    }

    /// File mode with the 0660 default applied
    pub fn file_mode(&self) -> Result<u32> {
        self.filemode.as_deref().map_or(Ok(0o660), parse_mode)
    }
}
