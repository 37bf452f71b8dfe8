//! Input (listener) configuration

use std::str::FromStr;
use std::time::Duration;

use parchment_net::Address;
use serde::Deserialize;

use crate::{parse_mode, Result};

/// One listener definition
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    /// Listen address: `tcp://host:port`, `unix:///path`, `unix://@name`
    pub address: String,

    /// Per-operation read/write deadline in milliseconds; 0 disables
    #[serde(default)]
    pub timeout_ms: u64,

    /// Socket file mode (non-abstract UNIX sockets only)
    #[serde(default)]
    pub filemode: Option<String>,

    /// Socket owner (non-abstract UNIX sockets only)
    #[serde(default)]
    pub user: Option<String>,

    /// Socket group (non-abstract UNIX sockets only)
    #[serde(default)]
    pub group: Option<String>,
}

impl InputConfig {
    /// Check the address scheme and any mode string
    pub fn validate(&self) -> Result<()> {
        Address::from_str(&self.address)?;
        if let Some(mode) = &self.filemode {
            parse_mode(mode)?;
        }
        Ok(())
    }

    /// The parsed listen address
    ///
    /// Only meaningful after `validate`; failures surface there first.
    pub fn parsed_address(&self) -> Result<Address> {
        Ok(Address::from_str(&self.address)?)
    }

    /// The per-operation deadline; zero means none
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
