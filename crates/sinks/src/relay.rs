//! Relay processor
//!
//! Forwards chains to an upstream router with at-least-once delivery.
//! While the upstream is unreachable, records divert to a disk spool;
//! once a connection is won, the spool drains oldest-first before live
//! traffic resumes. The processor is a four-state machine:
//!
//! ```text
//! CONNECTING ──dial ok──> REPLICATING ──spool empty──> CONNECTED
//!     ^  ^                    │                           │
//!     │  └────network error───┘                           │
//!     └───────────────network error───────────────────────┘
//!
//! any state ──spool error / close──> DONE
//! ```
//!
//! - **CONNECTING**: a spool writer is open; incoming chains append to
//!   it while a background dial runs. Dial failures retry after a fixed
//!   backoff with the same spool writer.
//! - **REPLICATING**: spooled segments are sent upstream and deleted on
//!   acknowledgement. The incoming queue is deliberately not drained
//!   here; it accumulates so spooled data keeps its oldest-first order.
//! - **CONNECTED**: the fast path. Arrivals are detached wholesale and
//!   sent directly. A failed send re-prepends the detached records ahead
//!   of any new arrivals, preserving order, and falls back to
//!   CONNECTING. The upstream may have received part of the failed
//!   frame; duplicates after recovery are accepted.
//! - **DONE**: terminal. Reached on close (clean) or on a latched spool
//!   error (fatal).
//!
//! The machine runs as a single task over a state enum. Shared state
//! (the incoming queue, the close flag, the latched spool error) sits
//! under one mutex; the lock is released across every I/O operation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parchment_net::{Address, Session};
use parchment_protocol::Chain;
use parchment_spool::{load_oldest, FileList, SpoolConfig, SpoolError, SpoolWriter};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::{Processor, Result, SinkError};

/// Deadline for one upstream dial attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for sending one chain upstream
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Sleep between failed dial attempts
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Relay processor configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream router address
    pub remote: Address,

    /// Spool location for outage buffering
    pub spool: SpoolConfig,

    /// Segment size cap; 0 selects the spool default (100 MiB)
    pub max_segment_size: u64,

    /// Per-attempt dial deadline
    pub connect_timeout: Duration,

    /// Per-chain send deadline
    pub send_timeout: Duration,

    /// Sleep between dial attempts
    pub reconnect_backoff: Duration,
}

impl RelayConfig {
    /// Create a config with default timeouts
    pub fn new(remote: Address, spool: SpoolConfig) -> Self {
        Self {
            remote,
            spool,
            max_segment_size: 0,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }
}

/// Queue state shared between callers and the machine task
struct Queue {
    incoming: Chain,
    closed: bool,
    /// Rendered spool error; set at most once, never cleared
    disk_err: Option<String>,
}

struct Shared {
    config: RelayConfig,
    state: parking_lot::Mutex<Queue>,
    arrivals: Notify,
}

impl Shared {
    /// Detach the whole incoming queue
    fn take_queue(&self) -> (Chain, bool) {
        let mut queue = self.state.lock();
        (std::mem::take(&mut queue.incoming), queue.closed)
    }

    /// Latch a fatal spool error and stop accepting writes
    fn latch_spool_error(&self, error: &SpoolError) {
        tracing::error!(error = %error, "relay spool failed; processor shutting down");
        let mut queue = self.state.lock();
        if queue.disk_err.is_none() {
            queue.disk_err = Some(error.to_string());
        }
        queue.closed = true;
    }

    fn fresh_spool(&self) -> SpoolWriter {
        SpoolWriter::new(self.config.spool.clone(), self.config.max_segment_size)
    }
}

enum Step {
    Connecting {
        spool: SpoolWriter,
        /// False only on the machine's very first entry: the initial
        /// dial gets to resolve before close is honored, so records
        /// spooled at startup are replayed rather than stranded when
        /// the upstream is actually reachable. Re-entries also carry
        /// the reconnect backoff.
        allow_close: bool,
    },
    Replicating {
        session: Session,
    },
    Connected {
        session: Session,
    },
    Done,
}

/// Processor forwarding chains to an upstream router via a disk spool
pub struct RelayProcessor {
    shared: Arc<Shared>,
    machine: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl RelayProcessor {
    /// Create the processor and start its state machine task
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: RelayConfig) -> Self {
        let shared = Arc::new(Shared {
            config,
            state: parking_lot::Mutex::new(Queue {
                incoming: Chain::new(),
                closed: false,
                disk_err: None,
            }),
            arrivals: Notify::new(),
        });

        let machine = tokio::spawn(run_machine(Arc::clone(&shared)));
        Self {
            shared,
            machine: parking_lot::Mutex::new(Some(machine)),
        }
    }
}

#[async_trait]
impl Processor for RelayProcessor {
    /// Queue a chain for forwarding
    ///
    /// Non-blocking and unbounded: during an outage the spool, not the
    /// queue, is the backpressure boundary. Fails only once a spool
    /// error has been latched.
    async fn write_chain(&self, mut chain: Chain) -> Result<()> {
        {
            let mut queue = self.shared.state.lock();
            if let Some(message) = &queue.disk_err {
                return Err(SinkError::SpoolFailed(message.clone()));
            }
            queue.incoming.append(&mut chain);
        }
        self.shared.arrivals.notify_one();
        Ok(())
    }

    /// Signal close, wait for the machine to finish, report the latch
    async fn close(&self) -> Result<()> {
        {
            let mut queue = self.shared.state.lock();
            queue.closed = true;
        }
        self.shared.arrivals.notify_one();

        let machine = self.machine.lock().take();
        if let Some(machine) = machine {
            let _ = machine.await;
        }

        let queue = self.shared.state.lock();
        match &queue.disk_err {
            Some(message) => Err(SinkError::SpoolFailed(message.clone())),
            None => Ok(()),
        }
    }
}

async fn run_machine(shared: Arc<Shared>) {
    let mut step = Step::Connecting {
        spool: shared.fresh_spool(),
        allow_close: false,
    };
    loop {
        step = match step {
            Step::Connecting { spool, allow_close } => {
                run_connecting(&shared, spool, allow_close).await
            }
            Step::Replicating { session } => run_replicating(&shared, session).await,
            Step::Connected { session } => run_connected(&shared, session).await,
            Step::Done => return,
        };
    }
}

/// CONNECTING: spool arrivals while dialing the upstream in background
async fn run_connecting(shared: &Arc<Shared>, mut spool: SpoolWriter, allow_close: bool) -> Step {
    let remote = shared.config.remote.clone();
    let connect_timeout = shared.config.connect_timeout;
    let sleep = if allow_close {
        shared.config.reconnect_backoff
    } else {
        Duration::ZERO
    };
    let mut dial = tokio::spawn(async move {
        if !sleep.is_zero() {
            tokio::time::sleep(sleep).await;
        }
        Session::connect(&remote, connect_timeout).await
    });

    loop {
        let (batch, closed) = shared.take_queue();
        if !batch.is_empty() {
            if let Err(e) = spool.write_chain(batch) {
                shared.latch_spool_error(&e);
                resolve_abandoned_dial(dial).await;
                return Step::Done;
            }
            // more may have arrived while writing
            continue;
        }

        // before the first dial has resolved, close must wait: a won
        // session still replays what was just spooled
        if closed && allow_close {
            // let the in-flight dial resolve (it carries its own
            // deadline); a won session is closed, never leaked
            resolve_abandoned_dial(dial).await;
            // final drain of anything that arrived while waiting
            loop {
                let (batch, _) = shared.take_queue();
                if batch.is_empty() {
                    break;
                }
                if let Err(e) = spool.write_chain(batch) {
                    shared.latch_spool_error(&e);
                    return Step::Done;
                }
            }
            if let Err(e) = spool.close() {
                shared.latch_spool_error(&e);
            }
            return Step::Done;
        }

        tokio::select! {
            result = &mut dial => {
                match result {
                    Ok(Ok(session)) => {
                        // flush the spool before replaying it
                        if let Err(e) = spool.close() {
                            shared.latch_spool_error(&e);
                            return Step::Done;
                        }
                        return Step::Replicating { session };
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(
                            remote = %shared.config.remote,
                            error = %e,
                            "failed to connect to upstream, will retry"
                        );
                        return Step::Connecting { spool, allow_close: true };
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "upstream dial task failed, will retry");
                        return Step::Connecting { spool, allow_close: true };
                    }
                }
            }
            _ = shared.arrivals.notified() => {}
        }
    }
}

/// Await a dial that is no longer wanted and drop any session it won
async fn resolve_abandoned_dial(dial: JoinHandle<parchment_net::Result<Session>>) {
    if let Ok(Ok(session)) = dial.await {
        drop(session);
    }
}

/// REPLICATING: drain the spool upstream, oldest segment first
///
/// The incoming queue accumulates here; records that arrived during the
/// outage must not overtake the spooled backlog.
async fn run_replicating(shared: &Arc<Shared>, mut session: Session) -> Step {
    let mut list = FileList::new();
    loop {
        let loaded = match load_oldest(&shared.config.spool, &mut list) {
            Ok(Some(loaded)) => loaded,
            Ok(None) => return Step::Connected { session },
            Err(e) => {
                shared.latch_spool_error(&e);
                return Step::Done;
            }
        };

        if let Err(e) = session
            .write_chain(&loaded.chain, shared.config.send_timeout)
            .await
        {
            tracing::warn!(
                remote = %shared.config.remote,
                error = %e,
                "failed to replay spooled records upstream, will retry"
            );
            return Step::Connecting {
                spool: shared.fresh_spool(),
                allow_close: true,
            };
        }

        if let Err(e) = loaded.delete() {
            shared.latch_spool_error(&e);
            return Step::Done;
        }
    }
}

/// CONNECTED: direct fast path with O(1) queue hand-off
async fn run_connected(shared: &Arc<Shared>, mut session: Session) -> Step {
    let mut want_close = false;
    loop {
        // wait for arrivals or close
        let (batch, closed) = loop {
            let (batch, closed) = shared.take_queue();
            if !batch.is_empty() || closed {
                break (batch, closed);
            }
            shared.arrivals.notified().await;
        };

        if !batch.is_empty() {
            if let Err(e) = session
                .write_chain(&batch, shared.config.send_timeout)
                .await
            {
                tracing::warn!(
                    remote = %shared.config.remote,
                    error = %e,
                    "failed to send log data upstream, will retry"
                );
                // partially received records upstream become duplicates
                // after recovery; order is preserved
                shared.state.lock().incoming.prepend(batch);
                return Step::Connecting {
                    spool: shared.fresh_spool(),
                    allow_close: true,
                };
            }
        }

        if want_close {
            drop(session);
            let empty = shared.state.lock().incoming.is_empty();
            return if empty {
                Step::Done
            } else {
                Step::Connecting {
                    spool: shared.fresh_spool(),
                    allow_close: true,
                }
            };
        }

        if closed {
            // one extra pass to flush arrivals racing the close
            want_close = true;
        }
    }
}
