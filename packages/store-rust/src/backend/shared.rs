//! Several execution contexts sharing one physical backend.
//!
//! [`SharedMemory`] owns a single [`MemoryBackend`]. Each call to
//! [`SharedMemory::context`] hands out a [`ContextBackend`] view with its own
//! [`ContextId`]. A mutation through one view raises a [`StorageSignal`] to
//! the listeners of every other view, never to its own.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{BackendCapabilities, BackendError, MemoryBackend, StorageBackend};
use crate::signal::{ContextId, SignalListener, SignalSource, StorageSignal};

struct SharedInner {
    backend: MemoryBackend,
    listeners: RwLock<Vec<(ContextId, SignalListener)>>,
    next_context: AtomicU64,
}

impl SharedInner {
    fn broadcast(&self, signal: &StorageSignal) {
        let targets: Vec<SignalListener> = self
            .listeners
            .read()
            .iter()
            .filter(|(id, _)| *id != signal.origin)
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in targets {
            listener(signal);
        }
    }
}

/// A physical backend shared between simulated contexts.
#[derive(Clone)]
pub struct SharedMemory {
    inner: Arc<SharedInner>,
}

impl SharedMemory {
    /// Creates a shared backend over a fresh, unbounded [`MemoryBackend`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(MemoryBackend::new())
    }

    /// Creates a shared backend over the given [`MemoryBackend`].
    #[must_use]
    pub fn with_backend(backend: MemoryBackend) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                backend,
                listeners: RwLock::new(Vec::new()),
                next_context: AtomicU64::new(1),
            }),
        }
    }

    /// Opens a new context view onto the shared backend.
    #[must_use]
    pub fn context(&self) -> ContextBackend {
        let id = ContextId(self.inner.next_context.fetch_add(1, Ordering::Relaxed));
        ContextBackend {
            id,
            shared: Arc::clone(&self.inner),
        }
    }

    /// Number of successful writes across all contexts.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.inner.backend.write_count()
    }
}

impl Default for SharedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMemory")
            .field("len", &self.inner.backend.len())
            .finish_non_exhaustive()
    }
}

/// One context's view of a [`SharedMemory`].
///
/// Implements both [`StorageBackend`] and [`SignalSource`]; listeners
/// registered here hear about mutations made by every other context.
#[derive(Clone)]
pub struct ContextBackend {
    id: ContextId,
    shared: Arc<SharedInner>,
}

impl ContextBackend {
    /// Identifier stamped on signals raised by this context.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    fn signal(&self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        self.shared.broadcast(&StorageSignal {
            key: key.to_string(),
            old_value,
            new_value,
            origin: self.id,
        });
    }
}

impl StorageBackend for ContextBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.shared.backend.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let old_value = self.shared.backend.get(key);
        self.shared.backend.set(key, value)?;
        if old_value.as_deref() != Some(value) {
            self.signal(key, old_value, Some(value.to_string()));
        }
        Ok(())
    }

    fn remove(&self, key: &str) {
        if let Some(old_value) = self.shared.backend.get(key) {
            self.shared.backend.remove(key);
            self.signal(key, Some(old_value), None);
        }
    }

    fn clear(&self) {
        let removed: Vec<(String, String)> = self
            .shared
            .backend
            .keys()
            .into_iter()
            .filter_map(|key| self.shared.backend.get(&key).map(|value| (key, value)))
            .collect();
        self.shared.backend.clear();
        for (key, old_value) in removed {
            self.signal(&key, Some(old_value), None);
        }
    }

    fn len(&self) -> usize {
        self.shared.backend.len()
    }

    fn key_at(&self, index: usize) -> Option<String> {
        self.shared.backend.key_at(index)
    }

    fn is_available(&self) -> bool {
        self.shared.backend.is_available()
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.shared.backend.capabilities()
    }
}

impl SignalSource for ContextBackend {
    fn listen(&self, listener: SignalListener) {
        self.shared.listeners.write().push((self.id, listener));
    }
}

impl fmt::Debug for ContextBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBackend")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
