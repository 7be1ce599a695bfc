//! Bounded fan-out of index requests.
//!
//! The index has no bulk write API, so every mutation phase fans out one
//! request per chunk. A [`WorkerPool`] caps how many run at once with a
//! semaphore and collects results with a [`JoinSet`].
//!
//! A pool is either *owned* (created for one operation and closed by
//! [`shutdown`](WorkerPool::shutdown)) or *shared* (wrapping a semaphore the
//! caller injected, which `shutdown` leaves open).

use docindex_core::error::{IndexError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    owned: bool,
}

impl WorkerPool {
    /// A fresh pool with `size` workers, owned by the caller.
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size.max(1))),
            owned: true,
        }
    }

    /// Wrap an injected semaphore. [`shutdown`](Self::shutdown) is a no-op.
    pub fn shared(semaphore: Arc<Semaphore>) -> Self {
        Self {
            semaphore,
            owned: false,
        }
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Run `f` over every item with bounded concurrency.
    ///
    /// Waits for all tasks, even after failures, and returns one result per
    /// item in input order. A task that panics yields
    /// [`IndexError::TaskFailed`] in its slot.
    pub async fn run_all<T, R, F, Fut>(&self, items: Vec<T>, f: F) -> Vec<Result<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let count = items.len();
        let mut set = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let semaphore = Arc::clone(&self.semaphore);
            let fut = f(item);
            set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => fut.await,
                    Err(_) => Err(IndexError::PoolClosed),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<R>>> = (0..count).map(|_| None).collect();
        let mut panic_message = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => panic_message = Some(e.to_string()),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(IndexError::TaskFailed(
                        panic_message
                            .clone()
                            .unwrap_or_else(|| "task did not complete".to_string()),
                    ))
                })
            })
            .collect()
    }

    /// Close an owned pool. Shared pools are left to their owner.
    pub fn shutdown(&self) {
        if self.owned {
            self.semaphore.close();
        }
    }
}

/// First error of a batch, after every result has been seen.
pub fn first_error<R>(results: Vec<Result<R>>) -> Result<Vec<R>> {
    let mut values = Vec::with_capacity(results.len());
    let mut first = None;
    for result in results {
        match result {
            Ok(v) => values.push(v),
            Err(e) if first.is_none() => first = Some(e),
            Err(_) => {}
        }
    }
    match first {
        Some(e) => Err(e),
        None => Ok(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_in_input_order() {
        let pool = WorkerPool::new(4);
        let results = pool
            .run_all(vec![30u64, 0, 10, 5], |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ms)
            })
            .await;
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![30, 0, 10, 5]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let results = pool
            .run_all((0..8).collect::<Vec<_>>(), |_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failures_do_not_cancel_siblings() {
        let pool = WorkerPool::new(3);
        let results = pool
            .run_all(vec![1, 2, 3], |n| async move {
                if n == 2 {
                    Err(IndexError::Transport("down".into()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert!(first_error(results).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_closes_only_owned_pools() {
        let semaphore = Arc::new(Semaphore::new(2));
        let shared = WorkerPool::shared(Arc::clone(&semaphore));
        shared.shutdown();
        assert!(!shared.is_owned());
        assert!(!semaphore.is_closed());

        let owned = WorkerPool::new(2);
        owned.shutdown();
        assert!(owned.is_closed());
        let results = owned.run_all(vec![1], |n| async move { Ok(n) }).await;
        assert!(matches!(results[0], Err(IndexError::PoolClosed)));
    }
}
