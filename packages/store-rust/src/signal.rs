//! Backend mutation signals raised by other execution contexts.
//!
//! A [`SignalSource`] delivers a [`StorageSignal`] for every mutation another
//! context makes to a shared backend. Self-writes are never delivered.
//! [`SignalHub`] is a source the host (or a test) drives by hand.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Opaque identifier of an execution context sharing a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context-{}", self.0)
    }
}

/// One backend mutation as seen by a different context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSignal {
    /// Physical backend key that changed.
    pub key: String,
    /// Raw value before the change. `None` if the key was absent.
    pub old_value: Option<String>,
    /// Raw value after the change. `None` if the key was removed.
    pub new_value: Option<String>,
    /// Context that made the change.
    pub origin: ContextId,
}

/// Callback invoked for every delivered signal.
pub type SignalListener = Arc<dyn Fn(&StorageSignal) + Send + Sync>;

/// Ambient stream of [`StorageSignal`]s.
///
/// Used as `Arc<dyn SignalSource>`.
pub trait SignalSource: Send + Sync {
    /// Registers a listener for all future signals.
    fn listen(&self, listener: SignalListener);
}

/// Hand-driven [`SignalSource`].
#[derive(Default)]
pub struct SignalHub {
    listeners: RwLock<Vec<SignalListener>>,
}

impl SignalHub {
    /// Creates a hub with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `signal` to every listener in registration order.
    pub fn emit(&self, signal: &StorageSignal) {
        // Snapshot first so listeners may register further listeners.
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener(signal);
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl SignalSource for SignalHub {
    fn listen(&self, listener: SignalListener) {
        self.listeners.write().push(listener);
    }
}

impl fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn signal(key: &str) -> StorageSignal {
        StorageSignal {
            key: key.to_string(),
            old_value: None,
            new_value: Some("v".to_string()),
            origin: ContextId(7),
        }
    }

    #[test]
    fn emit_reaches_every_listener() {
        let hub = SignalHub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            hub.listen(Arc::new(move |_: &StorageSignal| {
                hits.fetch_add(1, Ordering::Relaxed);
            }));
        }

        hub.emit(&signal("DStoa"));
        assert_eq!(hub.listener_count(), 3);
        assert_eq!(hits.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn emit_without_listeners_is_noop() {
        SignalHub::new().emit(&signal("DStoa"));
    }

    #[test]
    fn context_id_display() {
        assert_eq!(ContextId(3).to_string(), "context-3");
    }
}
