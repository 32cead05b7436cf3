//! Registry of detached work spawned by request handlers.
//!
//! Handlers hand analytics beacons to [`DetachedTasks::spawn`] and return
//! immediately. On shutdown the server calls [`DetachedTasks::drain`], which
//! waits for in-flight tasks up to a grace period and aborts the rest.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Clone, Default)]
pub struct DetachedTasks {
    inner: Arc<Mutex<JoinSet<()>>>,
}

impl DetachedTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` in the background. Finished tasks are reaped on each call so
    /// the set only holds work that is still running.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.inner.lock() {
            Ok(mut set) => {
                while let Some(done) = set.try_join_next() {
                    if let Err(e) = done {
                        warn!(error = %e, "background task panicked");
                    }
                }
                set.spawn(fut);
            }
            Err(_) => {
                warn!("task registry lock poisoned; spawning untracked");
                tokio::spawn(fut);
            }
        }
    }

    /// Tasks spawned and not yet reaped.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for all tracked tasks, at most `grace`. Returns how many were
    /// still running when the grace period ran out (and were aborted).
    pub async fn drain(&self, grace: Duration) -> usize {
        let mut set = match self.inner.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return 0,
        };
        if set.is_empty() {
            return 0;
        }
        info!(pending = set.len(), "draining background tasks");

        let waited = timeout(grace, async {
            while let Some(done) = set.join_next().await {
                if let Err(e) = done {
                    warn!(error = %e, "background task failed during drain");
                }
            }
        })
        .await;

        match waited {
            Ok(()) => {
                debug!("background tasks drained");
                0
            }
            Err(_) => {
                let left = set.len();
                warn!(abandoned = left, grace_ms = grace.as_millis() as u64, "grace period elapsed; aborting background tasks");
                set.abort_all();
                left
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn drain_waits_for_quick_tasks() {
        let tasks = DetachedTasks::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = counter.clone();
            tasks.spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(tasks.drain(Duration::from_secs(2)).await, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn drain_aborts_after_grace() {
        let tasks = DetachedTasks::new();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        assert_eq!(tasks.drain(Duration::from_millis(50)).await, 1);
    }

    #[tokio::test]
    async fn finished_tasks_are_reaped_on_spawn() {
        let tasks = DetachedTasks::new();
        tasks.spawn(async {});
        tokio::time::sleep(Duration::from_millis(50)).await;
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        assert_eq!(tasks.len(), 1);
        tasks.drain(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn panicking_task_does_not_poison_drain() {
        let tasks = DetachedTasks::new();
        tasks.spawn(async { panic!("boom") });
        assert_eq!(tasks.drain(Duration::from_secs(1)).await, 0);
    }
}
