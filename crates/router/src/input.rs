//! Input manager
//!
//! Owns the active listeners and the current output chain. Each input
//! is one bound listener (TCP or UNIX) with an accept loop; every
//! accepted connection runs a serve loop of
//!
//! ```text
//! read chain -> dispatch -> acknowledge
//! ```
//!
//! with the acknowledgement sent only after dispatch succeeds, so a
//! producer's acknowledged records are always downstream. Connection
//! shutdown is observed at read boundaries only; a dispatch in progress
//! always completes and acknowledges before the connection closes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parchment_config::InputConfig;
use parchment_net::{Address, ServerSession, SessionStream};
use parchment_protocol::Chain;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::{OutputChain, Result, RouterError};

/// Refcounted handle to one generation of the output chain
struct ChainRef {
    outputs: OutputChain,
    active: AtomicUsize,
    drained: Notify,
}

impl ChainRef {
    fn new(outputs: OutputChain) -> Self {
        Self {
            outputs,
            active: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Wait until every dispatch against this generation has finished
    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// RAII dispatch permit against one chain generation
struct DispatchGuard {
    chain: Arc<ChainRef>,
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        if self.chain.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.chain.drained.notify_waiters();
        }
    }
}

/// One active listener
struct Input {
    /// Configured address string, the reconfigure identity key
    address: String,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Input {
    /// Stop accepting, then wait for every connection to finish its
    /// current read/dispatch/acknowledge cycle
    async fn close(self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

/// Listener lifecycle and output chain owner
pub struct InputManager {
    current: RwLock<Arc<ChainRef>>,
    inputs: tokio::sync::Mutex<Vec<Input>>,
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InputManager {
    /// Create a manager with no inputs and an empty output chain
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(ChainRef::new(OutputChain::empty()))),
            inputs: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Apply a configuration: reconcile listeners, swap the chain
    ///
    /// Listener order: inputs whose addresses disappeared are stopped
    /// (closing their connections), newly listed addresses are started,
    /// surviving ones are left untouched. A listener that fails to bind
    /// is logged and skipped; the rest of the configuration still
    /// applies. Finally the output chain is swapped; the old chain's
    /// in-flight dispatches drain before its processors close.
    pub async fn reconfigure(self: &Arc<Self>, configs: &[InputConfig], chain: OutputChain) {
        {
            let mut inputs = self.inputs.lock().await;

            let wanted: HashSet<&str> = configs.iter().map(|c| c.address.as_str()).collect();
            let mut kept = Vec::with_capacity(inputs.len());
            for input in inputs.drain(..) {
                if wanted.contains(input.address.as_str()) {
                    kept.push(input);
                } else {
                    tracing::info!(address = %input.address, "closing input");
                    input.close().await;
                }
            }
            *inputs = kept;

            for config in configs {
                if inputs.iter().any(|input| input.address == config.address) {
                    continue;
                }
                match start_input(Arc::clone(self), config).await {
                    Ok(input) => inputs.push(input),
                    Err(e) => {
                        tracing::error!(address = %config.address, error = %e, "failed to start input");
                    }
                }
            }
        }

        let new_ref = Arc::new(ChainRef::new(chain));
        let old = {
            let mut current = self.current.write();
            std::mem::replace(&mut *current, new_ref)
        };
        old.wait_drained().await;
        old.outputs.close().await;
    }

    /// Stop all inputs and close the current chain's processors
    pub async fn shutdown(self: &Arc<Self>) {
        self.reconfigure(&[], OutputChain::empty()).await;
    }

    /// Take a dispatch permit on the current chain generation
    fn acquire_outputs(&self) -> DispatchGuard {
        let current = self.current.read();
        let chain = Arc::clone(&current);
        chain.active.fetch_add(1, Ordering::AcqRel);
        DispatchGuard { chain }
    }

    /// Route one chain through the current output chain
    pub async fn dispatch(&self, chain: Chain) -> Result<()> {
        let guard = self.acquire_outputs();
        guard.chain.outputs.dispatch(chain).await
    }
}

/// Bind a listener for `config` and spawn its accept loop
async fn start_input(manager: Arc<InputManager>, config: &InputConfig) -> Result<Input> {
    let address = config.parsed_address()?;

    // a previous process may have left its socket file behind
    #[cfg(unix)]
    if let Some(path) = address.unix_path() {
        let _ = std::fs::remove_file(path);
    }

    let listener = address.bind().await.map_err(|source| RouterError::Bind {
        address: address.to_string(),
        source,
    })?;

    #[cfg(unix)]
    apply_socket_permissions(config, &address)?;

    let cancel = CancellationToken::new();
    let tasks = TaskTracker::new();
    let input = Input {
        address: config.address.clone(),
        cancel: cancel.clone(),
        tasks: tasks.clone(),
    };

    let timeout = config.timeout();
    let address_text = address.to_string();
    tasks.spawn(accept_loop(
        manager,
        listener,
        address_text,
        timeout,
        cancel,
        tasks.clone(),
    ));

    Ok(input)
}

async fn accept_loop(
    manager: Arc<InputManager>,
    listener: parchment_net::Listener,
    address: String,
    timeout: Duration,
    cancel: CancellationToken,
    tasks: TaskTracker,
) {
    tracing::info!(address = %address, "listening for connections");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    let manager = Arc::clone(&manager);
                    let cancel = cancel.clone();
                    let address = address.clone();
                    tasks.spawn(async move {
                        if let Err(e) = serve_connection(manager, stream, timeout, cancel.clone()).await {
                            // connections torn down by shutdown are not errors
                            if !cancel.is_cancelled() {
                                tracing::warn!(
                                    address = %address,
                                    peer = %peer,
                                    error = %e,
                                    "failed to serve connection"
                                );
                            }
                        }
                    });
                }
                Err(e) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    tracing::warn!(address = %address, error = %e, "accept error");
                }
            }
        }
    }
    tracing::info!(address = %address, "no longer listening");
}

/// Per-connection serve loop: handshake, then read/dispatch/acknowledge
async fn serve_connection(
    manager: Arc<InputManager>,
    stream: Box<dyn SessionStream>,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut session = ServerSession::accept(stream, timeout).await?;

    loop {
        let chain = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = session.read(timeout) => result?,
        };
        let Some(chain) = chain else {
            // peer closed cleanly
            return Ok(());
        };

        manager.dispatch(chain).await?;
        session.acknowledge_last(timeout).await?;
    }
}

/// Apply configured mode and ownership to a bound UNIX socket
///
/// Owner and group must be numeric ids; name lookups would drag in a
/// resolver dependency, and deployments that need names can preresolve
/// them. A failure here skips the input, matching listener-bind
/// failures.
#[cfg(unix)]
fn apply_socket_permissions(config: &InputConfig, address: &Address) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let Some(path) = address.unix_path() else {
        return Ok(());
    };

    if let Some(mode) = &config.filemode {
        let mode = parchment_config::parse_mode(mode)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(
            |source| RouterError::SocketPermissions {
                path: path.to_path_buf(),
                source,
            },
        )?;
    }

    if config.user.is_some() || config.group.is_some() {
        let uid = parse_owner(config.user.as_deref())?;
        let gid = parse_owner(config.group.as_deref())?;
        std::os::unix::fs::chown(path, uid, gid).map_err(|source| {
            RouterError::SocketPermissions {
                path: path.to_path_buf(),
                source,
            }
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn parse_owner(value: Option<&str>) -> Result<Option<u32>> {
    match value {
        None => Ok(None),
        Some(text) => text
            .parse::<u32>()
            .map(Some)
            .map_err(|_| RouterError::NonNumericOwner {
                name: text.to_string(),
            }),
    }
}
