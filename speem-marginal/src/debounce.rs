//! Coalescing of bursts of calls into one delayed call.

use log::warn;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

type Task = Box<dyn FnOnce() + Send>;

struct Pending {
    timer: JoinHandle<()>,
    task: Arc<Mutex<Option<Task>>>,
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs only the last of a burst of scheduled tasks, once the burst has
/// been quiet for `delay`.
///
/// Tasks run on tokio's blocking pool, so a long recompute never stalls the
/// runtime threads.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<Pending>>,
}

impl Debouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Run `task` after the quiet period, superseding any pending task.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.delay;
        let slot: Arc<Mutex<Option<Task>>> = Arc::new(Mutex::new(Some(Box::new(task))));
        let fired = Arc::clone(&slot);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let task = lock(&fired).take();
            let Some(task) = task else {
                return;
            };
            if let Err(e) = tokio::task::spawn_blocking(task).await {
                warn!("debounced task failed: {e}");
            }
        });

        if let Some(previous) = lock(&self.pending).replace(Pending { timer, task: slot }) {
            previous.timer.abort();
        }
    }

    /// Run the pending task now, on the calling thread, if its timer has not
    /// fired yet. Returns true if a task ran.
    pub fn flush(&self) -> bool {
        let Some(pending) = lock(&self.pending).take() else {
            return false;
        };
        pending.timer.abort();
        let task = lock(&pending.task).take();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Drop the pending task, if any.
    pub fn cancel(&self) {
        if let Some(previous) = lock(&self.pending).take() {
            previous.timer.abort();
        }
    }

    /// Returns true while a scheduled task has not yet finished.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        lock(&self.pending)
            .as_ref()
            .is_some_and(|pending| !pending.timer.is_finished())
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_last_task_once() {
        let debouncer = Debouncer::new(Duration::from_millis(200));
        let runs = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));

        for value in 1..=10 {
            let (runs, last) = (Arc::clone(&runs), Arc::clone(&last));
            debouncer.schedule(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                last.store(value, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(debouncer.is_pending());
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 10);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        debouncer.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_runs_pending_task_once() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        debouncer.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(debouncer.flush());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
        assert!(!debouncer.flush());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_task_runs_off_the_runtime_thread() {
        let debouncer = Debouncer::new(Duration::from_millis(10));
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let release = Arc::new(std::sync::Barrier::new(2));
        let blocked = Arc::clone(&release);
        debouncer.schedule(move || {
            blocked.wait();
            let _ = done_tx.send(());
        });

        // The runtime thread keeps running timers while the task blocks.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(debouncer.is_pending());
        tokio::task::spawn_blocking(move || release.wait()).await.unwrap();
        done_rx.await.unwrap();
    }
}
