//! Single-delivery result cells
//!
//! A [`PendingResult`] is created paired with its handle. The network listener
//! pushes exactly one [`Delivery`] through the cell's channel; the first
//! consumer (`get()` or a drain) records it as the terminal outcome, which all
//! later reads return without waiting.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};

use super::handle::Handle;
use super::listener::{CallKind, Delivery};
use crate::protocol::{DriverError, ExecResult, QueryResponse};

/// Payload types a pending result can resolve to
pub trait Outcome: Clone + Send + Sync + std::fmt::Debug + 'static {
    /// Which registry kind carries this payload
    const KIND: CallKind;

    /// Extract this payload from a listener delivery
    fn from_delivery(delivery: Delivery) -> Result<Self, DriverError>;
}

impl Outcome for QueryResponse {
    const KIND: CallKind = CallKind::Query;

    fn from_delivery(delivery: Delivery) -> Result<Self, DriverError> {
        match delivery {
            Delivery::Query(resp) => Ok(resp),
            Delivery::Failed(err) => Err(err),
            Delivery::Closed(reason) => Err(DriverError::ConnectionLost(reason)),
            Delivery::Exec(_) => Err(DriverError::ProtocolError(
                "Expected query result, got exec result".to_string(),
            )),
        }
    }
}

impl Outcome for ExecResult {
    const KIND: CallKind = CallKind::Exec;

    fn from_delivery(delivery: Delivery) -> Result<Self, DriverError> {
        match delivery {
            Delivery::Exec(result) => Ok(result),
            Delivery::Failed(err) => Err(err),
            Delivery::Closed(reason) => Err(DriverError::ConnectionLost(reason)),
            Delivery::Query(_) => Err(DriverError::ProtocolError(
                "Expected exec result, got query result".to_string(),
            )),
        }
    }
}

/// Pending result of an asynchronous query
pub type QueryFuture = PendingResult<QueryResponse>;

/// Pending result of an asynchronous exec
pub type ExecFuture = PendingResult<ExecResult>;

/// One-shot result cell correlated by handle
pub struct PendingResult<T: Outcome> {
    handle: Handle,
    rx: tokio::sync::Mutex<Option<oneshot::Receiver<Delivery>>>,
    outcome: OnceLock<Result<T, DriverError>>,
    resolved: Notify,
    outstanding: Weak<OutstandingSet<T>>,
}

impl<T: Outcome> PendingResult<T> {
    pub(crate) fn new(
        handle: Handle,
        rx: oneshot::Receiver<Delivery>,
        outstanding: Weak<OutstandingSet<T>>,
    ) -> Self {
        Self {
            handle,
            rx: tokio::sync::Mutex::new(Some(rx)),
            outcome: OnceLock::new(),
            resolved: Notify::new(),
            outstanding,
        }
    }

    /// A cell with no delivery channel; it only resolves through `resolve_*`.
    pub fn detached(handle: Handle) -> Self {
        Self {
            handle,
            rx: tokio::sync::Mutex::new(None),
            outcome: OnceLock::new(),
            resolved: Notify::new(),
            outstanding: Weak::new(),
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Non-blocking peek: true until an outcome has been recorded
    pub fn is_active(&self) -> bool {
        self.outcome.get().is_none()
    }

    /// Recorded outcome, if any, without waiting
    pub fn try_get(&self) -> Option<Result<T, DriverError>> {
        self.outcome.get().cloned()
    }

    /// Record the terminal outcome.
    ///
    /// Returns `DuplicateResolution` if an outcome was already recorded; the
    /// stored outcome is never overwritten.
    pub fn try_resolve(&self, outcome: Result<T, DriverError>) -> Result<(), DriverError> {
        if self.outcome.set(outcome).is_err() {
            tracing::error!(handle = self.handle, "pending result resolved twice");
            return Err(DriverError::DuplicateResolution(self.handle));
        }

        if let Some(set) = self.outstanding.upgrade() {
            set.remove(self.handle);
        }
        self.resolved.notify_waiters();
        tracing::trace!(handle = self.handle, "pending result resolved");
        Ok(())
    }

    /// Resolve with a value.
    ///
    /// # Panics
    ///
    /// Panics if the result is already resolved: a handle must be delivered
    /// to exactly once.
    pub fn resolve_success(&self, value: T) {
        if let Err(e) = self.try_resolve(Ok(value)) {
            panic!("{}", e);
        }
    }

    /// Resolve with an error.
    ///
    /// # Panics
    ///
    /// Panics if the result is already resolved.
    pub fn resolve_error(&self, err: DriverError) {
        if let Err(e) = self.try_resolve(Err(err)) {
            panic!("{}", e);
        }
    }

    /// Wait for the outcome.
    ///
    /// Returns immediately once resolved; otherwise suspends the calling task
    /// until the listener delivers. Cancel-safe: dropping the returned future
    /// leaves the delivery channel in place for the next caller.
    pub async fn get(&self) -> Result<T, DriverError> {
        let notified = self.resolved.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(outcome) = self.outcome.get() {
            return outcome.clone();
        }

        let mut slot = tokio::select! {
            slot = self.rx.lock() => slot,
            _ = &mut notified => return self.recorded(),
        };
        if let Some(outcome) = self.outcome.get() {
            return outcome.clone();
        }

        if slot.is_none() {
            // Detached cell: only an explicit resolve can complete it.
            drop(slot);
            notified.await;
            return self.recorded();
        }

        let delivery = match slot.as_mut() {
            Some(rx) => tokio::select! {
                delivery = rx => delivery.ok(),
                _ = &mut notified => return self.recorded(),
            },
            None => None,
        };
        *slot = None;

        let outcome = match delivery {
            Some(delivery) => T::from_delivery(delivery),
            None => Err(DriverError::ConnectionLost(
                "Result was not available, channel was closed".to_string(),
            )),
        };

        match self.try_resolve(outcome.clone()) {
            Ok(()) => outcome,
            // An explicit resolve won the race; the stored outcome stands.
            Err(_) => self.recorded(),
        }
    }

    fn recorded(&self) -> Result<T, DriverError> {
        match self.outcome.get() {
            Some(outcome) => outcome.clone(),
            None => Err(DriverError::ProtocolError(format!(
                "Handle {} woke without an outcome",
                self.handle
            ))),
        }
    }
}

impl<T: Outcome> std::fmt::Debug for PendingResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResult")
            .field("handle", &self.handle)
            .field("outcome", &self.outcome.get())
            .finish()
    }
}

/// Futures issued asynchronously on a connection that have not resolved yet
pub(crate) struct OutstandingSet<T: Outcome> {
    futures: Mutex<HashMap<Handle, Arc<PendingResult<T>>>>,
}

impl<T: Outcome> OutstandingSet<T> {
    pub(crate) fn new() -> Self {
        Self {
            futures: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn insert(&self, future: Arc<PendingResult<T>>) {
        self.futures.lock().insert(future.handle(), future);
    }

    pub(crate) fn remove(&self, handle: Handle) -> Option<Arc<PendingResult<T>>> {
        self.futures.lock().remove(&handle)
    }

    /// Shallow copy: the futures themselves are shared, not cloned
    pub(crate) fn snapshot(&self) -> Vec<Arc<PendingResult<T>>> {
        let mut futures: Vec<_> = self.futures.lock().values().cloned().collect();
        futures.sort_by_key(|f| f.handle());
        futures
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.futures.lock().len()
    }
}
