//! Router error types

use std::io;
use std::path::PathBuf;

use parchment_config::ConfigError;
use parchment_net::NetError;
use parchment_sinks::SinkError;
use thiserror::Error;

/// Errors from compiling output chains and running inputs
#[derive(Debug, Error)]
pub enum RouterError {
    /// Invalid configuration reached compilation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failed to bind a listener
    #[error("failed to create listener for {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to chmod/chown a UNIX socket
    #[error("failed to set permissions on '{path}': {source}")]
    SocketPermissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Socket owner must be a numeric uid/gid
    #[error("socket owner '{name}' is not a numeric id")]
    NonNumericOwner { name: String },

    /// Wire session failure on a connection
    #[error(transparent)]
    Net(#[from] NetError),

    /// A processor rejected a dispatched chain
    #[error("failed to process chain for category '{category}': {source}")]
    Dispatch {
        category: String,
        #[source]
        source: SinkError,
    },
}
