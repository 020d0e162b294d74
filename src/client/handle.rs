use std::sync::atomic::{AtomicI64, Ordering};

/// Correlation key for one request/response pair
pub type Handle = i64;

/// Thread-safe source of unique, strictly increasing handles.
///
/// Build one per process and share it (via `Arc`) with every connection so
/// handles never collide, including across sequentially opened connections.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    last: AtomicI64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Next handle; the first one handed out is 1
    pub fn next(&self) -> Handle {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Most recently allocated handle (0 before the first allocation)
    pub fn last(&self) -> Handle {
        self.last.load(Ordering::SeqCst)
    }
}
