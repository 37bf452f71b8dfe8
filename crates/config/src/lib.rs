//! Parchment Configuration
//!
//! TOML-based configuration for the router daemon. A config is two
//! arrays: listeners to accept producer connections on, and outputs to
//! route records into.
//!
//! ```toml
//! [[inputs]]
//! address = "tcp://127.0.0.1:9514"
//! timeout_ms = 30000
//!
//! [[outputs]]
//! pattern = "^app"
//! type = "file"
//! path = "/var/log/parchment/${category}/out.log"
//!
//! [[outputs]]
//! type = "relay"
//! remote = "tcp://upstream:9514"
//! spool_dir = "/var/spool/parchment"
//! ```
//!
//! An output with no `pattern` is the default rule; at most one may
//! exist. Validation happens at load time and again on reload, so a bad
//! reload never tears down a running configuration.

mod error;
mod inputs;
mod outputs;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use error::ConfigError;
pub use inputs::InputConfig;
pub use outputs::{OutputConfig, OutputKind};

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Default record format when an output does not set one
pub const DEFAULT_FORMAT: &str = "[%category%] %message%";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Listener definitions
    pub inputs: Vec<InputConfig>,

    /// Output rules, in dispatch order
    pub outputs: Vec<OutputConfig>,
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = text.parse()?;
        Ok(config)
    }

    /// Validate every input and output
    ///
    /// Called by `load`/`FromStr`; exposed for configs assembled in
    /// code.
    pub fn validate(&self) -> Result<()> {
        for input in &self.inputs {
            input.validate()?;
        }

        let mut default_seen = false;
        for output in &self.outputs {
            output.validate()?;
            if output.pattern.is_empty() {
                if default_seen {
                    return Err(ConfigError::DuplicateDefault);
                }
                default_seen = true;
            }
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

/// Parse a file mode string, octal first, decimal fallback
///
/// Accepts `"0660"`, `"660"` (octal) and plain decimal values.
pub fn parse_mode(value: &str) -> Result<u32> {
    u32::from_str_radix(value, 8)
        .or_else(|_| value.parse::<u32>())
        .map_err(|_| ConfigError::InvalidMode {
            value: value.to_string(),
        })
}
