//! Fan-in over a runtime-sized set of pending results

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use super::pending::{ExecFuture, Outcome, PendingResult, QueryFuture};
use super::Connection;

/// Wait until every given result has resolved, in whatever order they
/// complete. Each outcome is recorded on its own result (errors included),
/// so later `get()` calls return at once. Results that are already resolved
/// are skipped. Returns how many results had to be waited on.
pub async fn wait_all<T, I>(futures: I) -> usize
where
    T: Outcome,
    I: IntoIterator<Item = Arc<PendingResult<T>>>,
{
    let mut waiting: FuturesUnordered<_> = futures
        .into_iter()
        .filter(|f| f.is_active())
        .map(|f| async move {
            let ok = f.get().await.is_ok();
            (f.handle(), ok)
        })
        .collect();

    let mut resolved = 0;
    while let Some((handle, ok)) = waiting.next().await {
        resolved += 1;
        tracing::trace!(handle, ok, remaining = waiting.len(), "drained result");
    }
    resolved
}

impl Connection {
    /// Wait for all of `futures` to resolve. Each one leaves the
    /// outstanding-query set as it resolves; futures that are already
    /// resolved are skipped. One failed query does not stop the drain; its
    /// error is stored on that query.
    pub async fn drain(&self, futures: &[Arc<QueryFuture>]) {
        wait_all(futures.iter().cloned()).await;
    }

    /// Drain every outstanding query and return them, all resolved
    pub async fn drain_all(&self) -> Vec<Arc<QueryFuture>> {
        let futures = self.outstanding_queries();
        self.drain(&futures).await;
        futures
    }

    /// Exec counterpart of [`Connection::drain`]
    pub async fn drain_execs(&self, futures: &[Arc<ExecFuture>]) {
        wait_all(futures.iter().cloned()).await;
    }

    /// Exec counterpart of [`Connection::drain_all`]
    pub async fn drain_all_execs(&self) -> Vec<Arc<ExecFuture>> {
        let futures = self.outstanding_execs();
        self.drain_execs(&futures).await;
        futures
    }
}
