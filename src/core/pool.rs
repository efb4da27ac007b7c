//! Bounded fan-out for independent per-target and per-profile tasks
//!
//! One `dispatch` call runs one level of fan-out. Each call owns a fresh
//! semaphore, so the per-target level and the per-profile level within a
//! target never share permits and nesting cannot deadlock.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Bounded-concurrency executor for independent tasks
///
/// Tasks beyond the bound queue on the semaphore; they never fail. Results
/// come back in submission order regardless of completion order, one result
/// per submitted task. A panicking task is converted to the caller-supplied
/// fallback instead of aborting its siblings.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    limit: usize,
}

impl WorkerPool {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every task with at most `limit` in flight at once.
    ///
    /// `on_abort` receives the submission index of a task that panicked (or
    /// was otherwise cancelled by the runtime) and produces its stand-in
    /// result, keeping the 1:1 task-to-result mapping intact.
    pub async fn dispatch<T, F, Fut, P>(&self, tasks: Vec<F>, on_abort: P) -> Vec<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        P: Fn(usize) -> T,
    {
        let semaphore = Arc::new(Semaphore::new(self.limit));

        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let semaphore = Arc::clone(&semaphore);
                tokio::spawn(async move {
                    // Acquire can only fail on a closed semaphore; this one
                    // lives exactly as long as the dispatch call and is
                    // never closed, so run unbounded rather than lose the
                    // task if that invariant is ever broken.
                    let _permit = semaphore.acquire_owned().await;
                    task().await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_err) => {
                    tracing::warn!(index, error = %join_err, "pool task aborted");
                    results.push(on_abort(index));
                }
            }
        }
        results
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_WORKER_LIMIT)
    }
}
