//! [`Scheduler`] backed by tokio timers.

use std::time::Duration;

use tokio::runtime::Handle;

use super::{Scheduler, Task, TaskHandle};

/// Runs each task on a spawned tokio task after `tokio::time::sleep`.
///
/// Cancelling the [`TaskHandle`] stops the task from running; the sleeping
/// tokio task then exits without doing anything.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    /// Creates a scheduler that spawns onto `runtime`.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Creates a scheduler on the runtime of the calling context, if any.
    #[must_use]
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let claim = handle.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if claim.claim() {
                task();
            }
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn task_fires_after_delay() {
        let scheduler = TokioScheduler::try_current().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let task_counter = Arc::clone(&counter);

        let handle = scheduler.schedule_once(
            Duration::from_millis(15),
            Box::new(move || {
                task_counter.fetch_add(1, Ordering::Relaxed);
            }),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert!(handle.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_does_not_fire() {
        let scheduler = TokioScheduler::new(Handle::current());
        let counter = Arc::new(AtomicUsize::new(0));
        let task_counter = Arc::clone(&counter);

        let handle = scheduler.schedule_once(
            Duration::from_millis(15),
            Box::new(move || {
                task_counter.fetch_add(1, Ordering::Relaxed);
            }),
        );
        assert!(handle.cancel());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn no_runtime_means_no_scheduler() {
        assert!(TokioScheduler::try_current().is_none());
    }
}
