//! parchment-cat - Pipe stdin into a parchment router
//!
//! ```bash
//! tail -f /var/log/app.log | parchment-cat -c app tcp://logs.internal:9514
//! ```
//!
//! Each non-empty stdin line becomes one record. Delivery is buffered
//! and retried, so the pipe keeps draining through short router
//! outages; EOF flushes whatever is queued before exiting.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use parchment_client::{ClientConfig, LogWriter, Timestamp};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Ship stdin lines to a parchment router
#[derive(Parser, Debug)]
#[command(name = "parchment-cat")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Router address, e.g. tcp://host:port or unix:///path
    remote: String,

    /// Category for incoming lines
    #[arg(short, default_value = "")]
    category: String,

    /// Prepend an RFC 3339 timestamp (second precision)
    #[arg(short = 't', long = "timestamp")]
    timestamp: bool,

    /// Prepend an RFC 3339 timestamp (nanosecond precision)
    #[arg(long = "tt", conflicts_with = "timestamp")]
    timestamp_nanos: bool,

    /// Connect/send timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let timestamp = if cli.timestamp {
        Timestamp::Seconds
    } else if cli.timestamp_nanos {
        Timestamp::Nanos
    } else {
        Timestamp::None
    };

    let writer = LogWriter::new(ClientConfig {
        address: cli.remote.clone(),
        timestamp,
        timeout: Duration::from_millis(cli.timeout_ms),
    })
    .with_context(|| format!("creating writer for '{}'", cli.remote))?;

    let category = cli.category.as_bytes();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.is_empty() {
                    continue;
                }
                if writer.add_message(category, line.as_bytes()).is_err() {
                    bail!("writer closed unexpectedly");
                }
            }
            Ok(None) => break,
            Err(e) => {
                writer.close().await;
                return Err(e).context("reading stdin");
            }
        }
    }

    writer.close().await;
    Ok(())
}
