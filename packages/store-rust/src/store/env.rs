//! Shared collaborators injected into every [`Store`](super::Store).

use std::sync::Arc;

use crate::backend::BackendRegistry;
use crate::scheduler::{ManualScheduler, Scheduler};
use crate::teardown::TeardownController;

/// Backends, scheduler and teardown hook shared by the stores of one
/// execution context.
///
/// Cheap to clone; every field is reference-counted.
#[derive(Clone)]
pub struct StoreEnv {
    /// Backend table resolved once per store.
    pub backends: BackendRegistry,
    /// Scheduler for debounced flushes.
    pub scheduler: Arc<dyn Scheduler>,
    /// Last-chance flush hook every store registers with.
    pub teardown: Arc<TeardownController>,
}

impl StoreEnv {
    /// Creates an environment with a fresh teardown controller.
    #[must_use]
    pub fn new(backends: BackendRegistry, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            backends,
            scheduler,
            teardown: Arc::new(TeardownController::new()),
        }
    }

    /// In-memory backends and a [`ManualScheduler`], returned alongside so
    /// the caller can drive the clock.
    #[must_use]
    pub fn manual() -> (Self, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let env = Self::new(BackendRegistry::in_memory(), Arc::clone(&scheduler) as _);
        (env, scheduler)
    }
}

impl std::fmt::Debug for StoreEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEnv")
            .field("backends", &self.backends)
            .field("teardown", &self.teardown)
            .finish_non_exhaustive()
    }
}
