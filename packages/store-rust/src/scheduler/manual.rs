//! Deterministic scheduler driven by a virtual clock.

use std::time::Duration;

use parking_lot::Mutex;

use super::{Scheduler, Task, TaskHandle};

struct Entry {
    due: Duration,
    seq: u64,
    handle: TaskHandle,
    task: Task,
}

#[derive(Default)]
struct ClockState {
    now: Duration,
    next_seq: u64,
    queue: Vec<Entry>,
}

/// [`Scheduler`] whose clock only moves when told to.
///
/// Tasks run on the thread calling [`advance`](ManualScheduler::advance),
/// ordered by due time and then by scheduling order. No lock is held while a
/// task runs, so tasks may schedule further tasks.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ClockState>,
}

impl ManualScheduler {
    /// Creates a scheduler at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Number of tasks that can still run.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .queue
            .iter()
            .filter(|entry| entry.handle.is_pending())
            .count()
    }

    /// Moves the clock forward by `by`, running every task that comes due.
    ///
    /// Returns the number of tasks that ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let ran = self.run_until(target);
        self.state.lock().now = target;
        ran
    }

    /// Runs every task already due at the current time.
    pub fn run_pending(&self) -> usize {
        let now = self.now();
        self.run_until(now)
    }

    fn run_until(&self, target: Duration) -> usize {
        let mut ran = 0;
        while let Some(entry) = self.pop_due(target) {
            if entry.handle.claim() {
                (entry.task)();
                ran += 1;
            }
        }
        ran
    }

    fn pop_due(&self, target: Duration) -> Option<Entry> {
        let mut state = self.state.lock();
        state.queue.retain(|entry| !entry.handle.is_cancelled());
        let index = state
            .queue
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.due <= target)
            .min_by_key(|(_, entry)| (entry.due, entry.seq))
            .map(|(index, _)| index)?;
        let entry = state.queue.swap_remove(index);
        state.now = state.now.max(entry.due);
        Some(entry)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now + delay;
        state.queue.push(Entry {
            due,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn counter_task(counter: &Arc<AtomicUsize>) -> Task {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        })
    }

    #[test]
    fn task_runs_only_once_due() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.schedule_once(Duration::from_millis(15), counter_task(&counter));

        assert_eq!(scheduler.advance(Duration::from_millis(14)), 0);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        assert!(handle.is_pending());

        assert_eq!(scheduler.advance(Duration::from_millis(1)), 1);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert!(handle.has_fired());

        assert_eq!(scheduler.advance(Duration::from_millis(100)), 0);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn cancelled_task_never_runs() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.schedule_once(Duration::from_millis(5), counter_task(&counter));

        assert_eq!(scheduler.pending_count(), 1);
        assert!(handle.cancel());
        assert_eq!(scheduler.pending_count(), 0);

        scheduler.advance(Duration::from_millis(10));
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn tasks_run_in_due_then_schedule_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (label, delay) in [("late", 20), ("first", 10), ("second", 10)] {
            let order = Arc::clone(&order);
            scheduler.schedule_once(
                Duration::from_millis(delay),
                Box::new(move || order.lock().push(label)),
            );
        }

        scheduler.advance(Duration::from_millis(30));
        assert_eq!(*order.lock(), vec!["first", "second", "late"]);
    }

    #[test]
    fn task_observes_its_due_time_and_may_reschedule() {
        let scheduler = Arc::new(ManualScheduler::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner_scheduler = Arc::clone(&scheduler);
        let inner_seen = Arc::clone(&seen);
        scheduler.schedule_once(
            Duration::from_millis(10),
            Box::new(move || {
                inner_seen.lock().push(inner_scheduler.now());
                let nested_seen = Arc::clone(&inner_seen);
                let nested_scheduler = Arc::clone(&inner_scheduler);
                inner_scheduler.schedule_once(
                    Duration::from_millis(10),
                    Box::new(move || nested_seen.lock().push(nested_scheduler.now())),
                );
            }),
        );

        scheduler.advance(Duration::from_millis(25));
        assert_eq!(
            *seen.lock(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(scheduler.now(), Duration::from_millis(25));
    }

    #[test]
    fn zero_delay_runs_on_run_pending() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.schedule_once(Duration::ZERO, counter_task(&counter));
        assert_eq!(scheduler.run_pending(), 1);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
