//! The producer-side log writer

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{Local, SecondsFormat};
use parchment_net::{Address, Session};
use parchment_protocol::{Chain, Record};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::{ClientError, Result};

/// Sleep between failed connect attempts
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Default per-attempt connect/send deadline
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timestamp prefix applied to enqueued messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Timestamp {
    /// No prefix; the payload is shipped as-is
    #[default]
    None,

    /// RFC 3339 at second precision, plus a trailing space
    Seconds,

    /// RFC 3339 at nanosecond precision, plus a trailing space
    Nanos,
}

/// Writer configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Router address: `tcp://host:port`, `unix:///path`, `unix://@name`
    pub address: String,

    /// Timestamp prefix mode
    pub timestamp: Timestamp,

    /// Per-attempt connect/send deadline
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            timestamp: Timestamp::None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

struct PendingQueue {
    pending: Chain,
    closed: bool,
}

struct Shared {
    remote: Address,
    timeout: Duration,
    timestamp: Timestamp,
    state: parking_lot::Mutex<PendingQueue>,
    arrivals: Notify,
    done: std::sync::atomic::AtomicBool,
    done_notify: Notify,
}

impl Shared {
    fn take_pending(&self) -> (Chain, bool) {
        let mut queue = self.state.lock();
        (std::mem::take(&mut queue.pending), queue.closed)
    }

    /// Block until the background worker has terminated
    async fn wait_done(&self) {
        use std::sync::atomic::Ordering;
        loop {
            let notified = self.done_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.done.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// Apply the configured timestamp prefix to a payload
    fn stamp(&self, payload: &[u8]) -> Bytes {
        let prefix = match self.timestamp {
            Timestamp::None => return Bytes::copy_from_slice(payload),
            Timestamp::Seconds => Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            Timestamp::Nanos => Local::now().to_rfc3339_opts(SecondsFormat::Nanos, false),
        };
        let mut message = Vec::with_capacity(prefix.len() + 1 + payload.len());
        message.extend_from_slice(prefix.as_bytes());
        message.push(b' ');
        message.extend_from_slice(payload);
        Bytes::from(message)
    }
}

/// Buffered writer shipping records to a router in the background
pub struct LogWriter {
    shared: Arc<Shared>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl LogWriter {
    /// Validate the address and start the background worker
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let remote = Address::from_str(&config.address)?;
        let timeout = if config.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            config.timeout
        };

        let shared = Arc::new(Shared {
            remote,
            timeout,
            timestamp: config.timestamp,
            state: parking_lot::Mutex::new(PendingQueue {
                pending: Chain::new(),
                closed: false,
            }),
            arrivals: Notify::new(),
            done: std::sync::atomic::AtomicBool::new(false),
            done_notify: Notify::new(),
        });

        let worker = tokio::spawn(run_worker(Arc::clone(&shared)));
        Ok(Self {
            shared,
            worker: parking_lot::Mutex::new(Some(worker)),
        })
    }

    /// Block until the writer shuts down
    ///
    /// The worker is already running in the background; this is a
    /// supervision point for callers that want to park a task on the
    /// writer's lifetime. Returns once `close` has drained the queue.
    pub async fn run(&self) {
        self.shared.wait_done().await;
    }

    /// Enqueue one record; never blocks
    ///
    /// The timestamp prefix, if configured, is applied at enqueue time
    /// so records carry the moment they were produced, not sent.
    pub fn add_message(&self, category: &[u8], payload: &[u8]) -> Result<()> {
        let message = self.shared.stamp(payload);
        {
            let mut queue = self.shared.state.lock();
            if queue.closed {
                return Err(ClientError::Closed);
            }
            queue
                .pending
                .push(Record::new(Bytes::copy_from_slice(category), message));
        }
        self.shared.arrivals.notify_one();
        Ok(())
    }

    /// Stop accepting records and wait for the queue to drain
    ///
    /// Idempotent. Draining is bounded: if the router is unreachable,
    /// the worker gives up after one failed attempt per remaining batch
    /// rather than holding shutdown hostage.
    pub async fn close(&self) {
        {
            let mut queue = self.shared.state.lock();
            queue.closed = true;
        }
        self.shared.arrivals.notify_one();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

/// Background connect/send loop
async fn run_worker(shared: Arc<Shared>) {
    send_loop(&shared).await;
    shared
        .done
        .store(true, std::sync::atomic::Ordering::Release);
    shared.done_notify.notify_waiters();
}

async fn send_loop(shared: &Arc<Shared>) {
    'connecting: loop {
        // idle until there is something to do
        loop {
            let (has_work, closed) = {
                let queue = shared.state.lock();
                (!queue.pending.is_empty(), queue.closed)
            };
            if has_work {
                break;
            }
            if closed {
                return;
            }
            shared.arrivals.notified().await;
        }

        let mut session = match Session::connect(&shared.remote, shared.timeout).await {
            Ok(session) => session,
            Err(e) => {
                let closed = shared.state.lock().closed;
                if closed {
                    abandon_queue(shared, &e);
                    return;
                }
                tracing::warn!(remote = %shared.remote, error = %e, "failed to connect, will retry");
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue 'connecting;
            }
        };

        loop {
            let (batch, closed) = shared.take_pending();
            if batch.is_empty() {
                if closed {
                    return;
                }
                shared.arrivals.notified().await;
                continue;
            }

            if let Err(e) = session.write_chain(&batch, shared.timeout).await {
                // unacknowledged records go back in front; the router may
                // still have received them, so duplicates are possible
                shared.state.lock().pending.prepend(batch);
                let closed = shared.state.lock().closed;
                if closed {
                    abandon_queue(shared, &e);
                    return;
                }
                tracing::warn!(remote = %shared.remote, error = %e, "failed to send, reconnecting");
                continue 'connecting;
            }
        }
    }
}

/// Drop whatever is still queued when shutdown races a dead router
fn abandon_queue(shared: &Arc<Shared>, error: &parchment_net::NetError) {
    let queue = shared.state.lock();
    if !queue.pending.is_empty() {
        tracing::error!(
            remote = %shared.remote,
            records = queue.pending.len(),
            error = %error,
            "router unreachable during shutdown, dropping queued records"
        );
    }
}
