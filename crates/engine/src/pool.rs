// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bounded Worker Pool: a fixed number of concurrent
//! slots, gated by a semaphore the way [`packlab_fleet::FleetManager`] gates
//! device leases with its own mutex + notify pair. `stop()` rejects new
//! submissions and waits for every in-flight slot to free up before
//! returning, so a caller that awaits it knows nothing is still running.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::{EngineError, Result};

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    concurrency: u32,
    stopped: AtomicBool,
}

impl WorkerPool {
    /// `concurrency` is clamped to at least 1.
    pub fn new(concurrency: u32) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency as usize)),
            concurrency,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn concurrency(&self) -> u32 {
        self.concurrency
    }

    /// Runs `work` once a slot is free, holding that slot for the duration
    /// of the future. Rejects immediately if the pool has been stopped.
    pub async fn submit_and_wait<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(EngineError::PoolStopped);
        }
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| EngineError::PoolStopped)?;
        let result = work().await;
        drop(permit);
        Ok(result)
    }

    /// Rejects every submission from this point on, then blocks until every
    /// slot currently in use has been released.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Ok(permits) = self.semaphore.acquire_many(self.concurrency).await {
            permits.forget();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn bounds_concurrent_work_to_configured_size() {
        let pool = Arc::new(WorkerPool::new(2));
        let in_flight = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                pool.submit_and_wait(|| async {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn stop_rejects_new_submissions() {
        let pool = WorkerPool::new(1);
        pool.stop().await;
        let err = pool.submit_and_wait(|| async {}).await.unwrap_err();
        assert!(matches!(err, EngineError::PoolStopped));
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_work_to_finish() {
        let pool = Arc::new(WorkerPool::new(1));
        let finished = Arc::new(AtomicBool::new(false));

        let worker_pool = pool.clone();
        let worker_finished = finished.clone();
        let handle = tokio::spawn(async move {
            worker_pool
                .submit_and_wait(|| async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    worker_finished.store(true, Ordering::SeqCst);
                })
                .await
                .unwrap();
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.stop().await;
        assert!(finished.load(Ordering::SeqCst));
        handle.await.unwrap();
    }
}
