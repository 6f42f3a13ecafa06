//! Single-shot deferred tasks.
//!
//! [`Scheduler::schedule_once`] runs a task after a delay and returns a
//! [`TaskHandle`] that can cancel it. A task runs at most once, and a
//! cancelled task never runs. Two implementations are provided:
//! [`ManualScheduler`] (virtual clock, advanced explicitly) and
//! [`TokioScheduler`] (timers on a tokio runtime).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod manual;
mod timer;

pub use manual::ManualScheduler;
pub use timer::TokioScheduler;

/// Work deferred by a [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks once after a delay.
///
/// Used as `Arc<dyn Scheduler>`.
pub trait Scheduler: Send + Sync {
    /// Schedules `task` to run once after `delay`.
    fn schedule_once(&self, delay: Duration, task: Task) -> TaskHandle;
}

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Cancelable handle to a scheduled task.
///
/// Clones share state. The handle moves from pending to exactly one of
/// fired or cancelled.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    state: Arc<AtomicU8>,
}

impl TaskHandle {
    /// Creates a handle in the pending state. Scheduler implementations
    /// hand one clone to the caller and keep another.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    /// Cancels the task if it has not fired yet.
    ///
    /// Returns `true` if this call prevented the task from running.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claims the right to run the task. Returns `false` if it was
    /// cancelled or already claimed.
    pub fn claim(&self) -> bool {
        self.state
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns `true` if the task was cancelled before firing.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Returns `true` if the task has been claimed for running.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }

    /// Returns `true` while the task can still run.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}
