//! Parchment Client - Producer-side writer
//!
//! The library producers embed to ship log records to a router. Calls to
//! [`LogWriter::add_message`] are non-blocking enqueues; a background
//! worker owns the connection and retries through outages:
//!
//! ```text
//! add_message() -> [queue] -> worker: connect / send chain / await ack
//!                                 ^          |
//!                                 └──retry───┘ (1s backoff, resend unacked)
//! ```
//!
//! A chain that fails mid-send is re-queued ahead of newer records, so
//! a single producer's records reach the router in order, possibly
//! duplicated across a reconnect (the router side is at-least-once by
//! design).
//!
//! # Example
//!
//! ```ignore
//! use parchment_client::{ClientConfig, LogWriter, Timestamp};
//!
//! let writer = LogWriter::new(ClientConfig {
//!     address: "tcp://logs.internal:9514".into(),
//!     timestamp: Timestamp::Seconds,
//!     ..Default::default()
//! })?;
//!
//! writer.add_message(b"app", b"service started")?;
//! writer.close().await;
//! ```

mod error;
mod writer;

pub use error::ClientError;
pub use writer::{ClientConfig, LogWriter, Timestamp};

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
