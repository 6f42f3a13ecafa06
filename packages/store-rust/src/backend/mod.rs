//! Physical backend capability consumed by the store engine.
//!
//! Defines [`StorageBackend`], a synchronous string-only key-value store
//! (the shape of browser `localStorage`), the closed [`BackendKind`] enum and
//! the [`BackendRegistry`] that maps each kind to an injected backend.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

mod memory;
mod shared;

pub use memory::MemoryBackend;
pub use shared::{ContextBackend, SharedMemory};

/// Errors raised by a [`StorageBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The write would push the backend past its capacity.
    #[error("quota exceeded writing {key}: {attempted} bytes over a limit of {limit}")]
    QuotaExceeded {
        key: String,
        attempted: usize,
        limit: usize,
    },

    /// The backend is switched off or otherwise unusable.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

/// Static capabilities reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Whether the runtime offers native structured serialization. When
    /// `false`, stores use the compact fallback codec.
    pub native_structured: bool,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            native_structured: true,
        }
    }
}

/// Synchronous, string-only key-value backend.
///
/// All operations are synchronous. Used as `Arc<dyn StorageBackend>`.
pub trait StorageBackend: Send + Sync {
    /// Returns the value stored at `key`, or `None`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::QuotaExceeded`] if the backend is full.
    fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Removes `key`. Missing keys are ignored.
    fn remove(&self, key: &str);

    /// Removes every key.
    fn clear(&self);

    /// Number of stored keys.
    fn len(&self) -> usize;

    /// Returns `true` if no keys are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the key at `index` in the backend's enumeration order.
    fn key_at(&self, index: usize) -> Option<String>;

    /// Returns every key in enumeration order.
    fn keys(&self) -> Vec<String> {
        (0..self.len()).filter_map(|i| self.key_at(i)).collect()
    }

    /// Capability probe.
    fn is_available(&self) -> bool {
        true
    }

    /// Static capabilities of this backend.
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }
}

/// Which backend of a [`BackendRegistry`] a store writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    /// Long-lived storage (`localStorage`).
    #[default]
    Primary,
    /// Storage scoped to the current session (`sessionStorage`).
    Ephemeral,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Ephemeral => f.write_str("ephemeral"),
        }
    }
}

/// Table mapping each [`BackendKind`] to an injected backend.
///
/// Resolved once when a store is opened; stores hold the resolved
/// `Arc<dyn StorageBackend>` for their whole life.
#[derive(Clone)]
pub struct BackendRegistry {
    primary: Arc<dyn StorageBackend>,
    ephemeral: Arc<dyn StorageBackend>,
}

impl BackendRegistry {
    /// Creates a registry from two backends.
    #[must_use]
    pub fn new(primary: Arc<dyn StorageBackend>, ephemeral: Arc<dyn StorageBackend>) -> Self {
        Self { primary, ephemeral }
    }

    /// Creates a registry backed by two fresh [`MemoryBackend`]s.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
        )
    }

    /// Returns the backend for `kind`.
    #[must_use]
    pub fn resolve(&self, kind: BackendKind) -> Arc<dyn StorageBackend> {
        match kind {
            BackendKind::Primary => Arc::clone(&self.primary),
            BackendKind::Ephemeral => Arc::clone(&self.ephemeral),
        }
    }

    /// Returns `true` if every registered backend is available.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.primary.is_available() && self.ephemeral.is_available()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("primary_len", &self.primary.len())
            .field("ephemeral_len", &self.ephemeral.len())
            .finish()
    }
}
