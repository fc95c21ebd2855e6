//! Bounded pool for backend and storage calls

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::trace;

/// Limits how many external calls run at once.
///
/// Coordination (collection membership, cached tunnel fields) never goes
/// through the worker; only the calls that leave the process do.
#[derive(Clone)]
pub struct AsyncWorker {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl AsyncWorker {
    pub fn new(max_concurrency: usize) -> Self {
        let capacity = max_concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of calls currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Run `task` once a slot is free
    pub async fn run<F: Future>(&self, task: F) -> F::Output {
        // The semaphore is never closed, so acquire only fails in theory
        let _permit = self.permits.acquire().await.ok();
        trace!("worker slot acquired ({} in flight)", self.in_flight());
        task.await
    }
}

impl Default for AsyncWorker {
    fn default() -> Self {
        Self::new(4)
    }
}
