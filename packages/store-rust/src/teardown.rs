//! Last-chance flush before the execution context goes away.
//!
//! Uses `ArcSwap` for lock-free lifecycle state transitions and a `watch`
//! channel so async listeners can react to teardown. Stores register
//! themselves as weak [`Flushable`] targets when they open.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};

/// Lifecycle state, moved forward by [`TeardownController::trigger_teardown`].
///
/// State machine: Live -> `TearingDown` -> Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Normal operation.
    Live,
    /// Teardown fired; flush targets are being drained.
    TearingDown,
    /// Every target has been flushed (or failed to).
    Closed,
}

/// Something that must be flushed before teardown completes.
pub trait Flushable: Send + Sync {
    /// Human-readable identity used in logs and reports.
    fn label(&self) -> String;

    /// Writes pending state synchronously. Returns `true` if anything was
    /// written.
    ///
    /// # Errors
    ///
    /// Returns the error raised by the underlying flush.
    fn teardown_flush(&self) -> StoreResult<bool>;
}

/// Outcome of a teardown pass.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Targets that had pending state and wrote it.
    pub flushed: usize,
    /// Targets whose flush failed, with their label.
    pub failures: Vec<(String, StoreError)>,
}

impl TeardownReport {
    /// Returns `true` if every target flushed cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fires the teardown signal once and flushes every registered target.
pub struct TeardownController {
    signal: watch::Sender<bool>,
    state: Arc<ArcSwap<LifecycleState>>,
    targets: Mutex<Vec<Weak<dyn Flushable>>>,
    fired: AtomicBool,
}

impl TeardownController {
    /// Creates a controller in the `Live` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            signal: tx,
            state: Arc::new(ArcSwap::from_pointee(LifecycleState::Live)),
            targets: Mutex::new(Vec::new()),
            fired: AtomicBool::new(false),
        }
    }

    /// Registers a target. Dropped targets are pruned lazily.
    pub fn register(&self, target: Weak<dyn Flushable>) {
        let mut targets = self.targets.lock();
        targets.retain(|t| t.strong_count() > 0);
        targets.push(target);
    }

    /// Number of registered targets still alive.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.targets
            .lock()
            .iter()
            .filter(|t| t.strong_count() > 0)
            .count()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        **self.state.load()
    }

    /// Returns a receiver that flips to `true` when teardown fires.
    #[must_use]
    pub fn teardown_receiver(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }

    /// Flushes every live target synchronously.
    ///
    /// Runs once; later calls return an empty report. Failures are logged
    /// and collected, and never stop the remaining targets from flushing.
    pub fn trigger_teardown(&self) -> TeardownReport {
        if self.fired.swap(true, Ordering::AcqRel) {
            return TeardownReport::default();
        }
        self.state.store(Arc::new(LifecycleState::TearingDown));
        // Ignore send errors -- receivers may have been dropped
        let _ = self.signal.send(true);

        let targets: Vec<Arc<dyn Flushable>> = {
            let mut targets = self.targets.lock();
            targets.retain(|t| t.strong_count() > 0);
            targets.iter().filter_map(Weak::upgrade).collect()
        };

        let mut report = TeardownReport::default();
        for target in targets {
            match target.teardown_flush() {
                Ok(true) => report.flushed += 1,
                Ok(false) => {}
                Err(err) => {
                    let label = target.label();
                    warn!(target = %label, error = %err, "teardown flush failed");
                    report.failures.push((label, err));
                }
            }
        }

        self.state.store(Arc::new(LifecycleState::Closed));
        info!(
            flushed = report.flushed,
            failed = report.failures.len(),
            "teardown complete"
        );
        report
    }
}

impl Default for TeardownController {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TeardownController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeardownController")
            .field("state", &self.state())
            .field("targets", &self.registered_count())
            .finish_non_exhaustive()
    }
}
