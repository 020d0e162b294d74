//! Network listener: sole reader of a connection's stream.
//!
//! ```text
//!   caller task                       listener task
//!   ───────────                       ─────────────
//!   register(handle) ──► Registry ◄── route(frame): remove(handle), send Delivery
//!   write frame                        read_frame() loop
//!   await PendingResult ◄──────────── oneshot<Delivery>
//! ```
//!
//! Every registered handle leaves the registry exactly once: routed by the
//! listener, removed by the caller after a failed send, or failed in bulk
//! when the loop exits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::handle::Handle;
use crate::protocol::{codec, frame, DriverError, ExecResult, QueryResponse, ResponseFrame};

/// Boxed read half owned by the listener
pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// What a registered handle is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Query,
    Exec,
}

/// Value pushed from the listener to a pending result
#[derive(Debug)]
pub enum Delivery {
    Query(QueryResponse),
    Exec(ExecResult),
    /// The server answered with a failure status
    Failed(DriverError),
    /// The listener stopped before a response arrived
    Closed(String),
}

struct Slot {
    kind: CallKind,
    tx: oneshot::Sender<Delivery>,
}

#[derive(Default)]
struct RegistryState {
    slots: HashMap<Handle, Slot>,
    /// Set once the listener has exited; later registrations are refused
    closed: Option<String>,
}

/// Handles awaiting a response, shared by callers and the listener
#[derive(Default)]
pub(crate) struct Registry {
    state: Mutex<RegistryState>,
    orphaned: AtomicU64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &self,
        handle: Handle,
        kind: CallKind,
    ) -> Result<oneshot::Receiver<Delivery>, DriverError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.closed {
            return Err(DriverError::ConnectionLost(reason.clone()));
        }

        let (tx, rx) = oneshot::channel();
        let prev = state.slots.insert(handle, Slot { kind, tx });
        debug_assert!(prev.is_none(), "handle {} registered twice", handle);
        tracing::trace!(handle, ?kind, pending = state.slots.len(), "registered handle");
        Ok(rx)
    }

    /// Deregister a handle whose request never made it onto the wire
    pub(crate) fn remove(&self, handle: Handle) -> bool {
        self.state.lock().slots.remove(&handle).is_some()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, handle: Handle) -> bool {
        self.state.lock().slots.contains_key(&handle)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Why the registry stopped accepting handles, if it has
    pub(crate) fn closed_reason(&self) -> Option<String> {
        self.state.lock().closed.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    pub(crate) fn orphaned(&self) -> u64 {
        self.orphaned.load(Ordering::Relaxed)
    }

    /// Deliver a decoded response to the waiter registered under its handle
    pub(crate) fn route(&self, frame: ResponseFrame) {
        let handle = frame.handle;
        let slot = self.state.lock().slots.remove(&handle);

        let Some(slot) = slot else {
            // Usually a reply to a request whose send path already failed.
            let total = self.orphaned.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(handle, orphaned = total, "Dropping response for unknown handle");
            return;
        };

        let delivery = match frame.check_status() {
            Err(e) => Delivery::Failed(e),
            Ok(()) => match slot.kind {
                CallKind::Query => Delivery::Query(QueryResponse::from(frame)),
                CallKind::Exec => Delivery::Exec(ExecResult::from(frame)),
            },
        };

        if slot.tx.send(delivery).is_err() {
            tracing::debug!(handle, "Result receiver dropped before delivery");
        } else {
            tracing::trace!(handle, "delivered response");
        }
    }

    /// Resolve every remaining waiter with `Closed` and refuse new handles.
    /// Returns how many waiters were failed.
    pub(crate) fn fail_all(&self, reason: &str) -> usize {
        let slots: Vec<(Handle, Slot)> = {
            let mut state = self.state.lock();
            state.closed.get_or_insert_with(|| reason.to_string());
            state.slots.drain().collect()
        };

        let count = slots.len();
        for (handle, slot) in slots {
            tracing::trace!(handle, "failing pending handle");
            let _ = slot.tx.send(Delivery::Closed(reason.to_string()));
        }
        count
    }
}

/// Background task reading frames for one connection
pub(crate) struct NetworkListener {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl NetworkListener {
    /// Spawn the read loop
    pub(crate) fn start(reader: BoxedReader, registry: Arc<Registry>, max_message_size: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(Self::run(reader, registry, max_message_size, shutdown_rx));
        Self {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the loop to stop and wait until it has exited.
    ///
    /// Does not close the stream. Once this returns, every handle that was
    /// still registered has been failed and no further deliveries happen.
    pub(crate) async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Network listener task failed: {}", e);
            }
        }
    }

    async fn run(
        mut reader: BoxedReader,
        registry: Arc<Registry>,
        max_message_size: usize,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        tracing::debug!("Network listener started");

        let reason = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break "Connection closed".to_string(),
                payload = frame::read_frame(&mut reader, max_message_size) => {
                    let payload = match payload {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::warn!("Network listener read failed: {}", e);
                            break e.to_string();
                        }
                    };
                    match codec::deserialize_response(&payload) {
                        Ok(frame) => registry.route(frame),
                        Err(e) => {
                            tracing::warn!("Malformed response frame: {}", e);
                            break e.to_string();
                        }
                    }
                }
            }
        };

        let failed = registry.fail_all(&reason);
        tracing::debug!(failed, reason = %reason, "Network listener stopped");
    }
}

impl Drop for NetworkListener {
    fn drop(&mut self) {
        // Dropped without stop(): the waiters see their channels close.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
