//! Bounded task pool shared by all VFS fan-out.

use std::future::Future;
use tokio::sync::Semaphore;

/// A fixed number of permits over a FIFO semaphore. Every fan-out sub-task
/// holds one permit for its whole run, so at most `size` sub-tasks make
/// progress at once no matter how many operations are in flight.
pub(crate) struct TaskPool {
    permits: Semaphore,
    size: u64,
}

impl TaskPool {
    pub(crate) fn new(size: u64) -> Self {
        Self {
            permits: Semaphore::new(size as usize),
            size,
        }
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// Run one sub-task under a pool permit.
    pub(crate) async fn run<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let _permit = self.permits.acquire().await.unwrap();
        task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrency_never_exceeds_pool_size() {
        let pool = TaskPool::new(2);
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let tasks = (0..8).map(|_| {
            pool.run(async {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
        });
        futures::future::join_all(tasks).await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
