//! Configuration types for stores and the change bridge.

use std::time::Duration;

use diskstore_core::CodecStrategy;

use crate::backend::BackendKind;

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Prefix prepended to every namespace to form the physical backend key.
pub const DEFAULT_PREFIX: &str = "DSto";

/// Debounce interval between the first mutation and the deferred flush.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(15);

/// Options for [`Store::open`](crate::Store::open).
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Logical namespace. An empty string falls back to [`DEFAULT_NAMESPACE`].
    pub namespace: String,
    /// Which backend of the registry holds the record.
    pub backend: BackendKind,
    /// Physical key prefix. An empty string falls back to [`DEFAULT_PREFIX`].
    pub prefix: String,
    /// Delay before a scheduled flush runs.
    pub flush_delay: Duration,
    /// Backend key to adopt data from on open. The key is removed afterwards.
    pub import_key: Option<String>,
    /// Fail `open` with [`StoreError::CorruptRecord`](crate::StoreError::CorruptRecord)
    /// instead of starting empty when the record cannot be decoded.
    pub strict_load: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            backend: BackendKind::Primary,
            prefix: DEFAULT_PREFIX.to_string(),
            flush_delay: DEFAULT_FLUSH_DELAY,
            import_key: None,
            strict_load: false,
        }
    }
}

impl StoreOptions {
    /// Default options for the given namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Sets the backend kind.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the debounce interval.
    #[must_use]
    pub fn with_flush_delay(mut self, flush_delay: Duration) -> Self {
        self.flush_delay = flush_delay;
        self
    }

    /// Sets the key to import from on open.
    #[must_use]
    pub fn with_import_key(mut self, import_key: impl Into<String>) -> Self {
        self.import_key = Some(import_key.into());
        self
    }

    /// Returns the namespace with the empty-string fallback applied.
    pub(crate) fn effective_namespace(&self) -> &str {
        if self.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            &self.namespace
        }
    }

    /// Returns the prefix with the empty-string fallback applied.
    pub(crate) fn effective_prefix(&self) -> &str {
        if self.prefix.is_empty() {
            DEFAULT_PREFIX
        } else {
            &self.prefix
        }
    }
}

/// Target identity for [`Store::clone_with`](crate::Store::clone_with).
///
/// Fields left as `None`, and an empty namespace, inherit the source
/// store's value.
#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    /// Namespace of the clone. Empty inherits the source namespace.
    pub namespace: String,
    /// Backend kind of the clone.
    pub backend: Option<BackendKind>,
    /// Physical key prefix of the clone.
    pub prefix: Option<String>,
}

impl CloneOptions {
    /// Clone into `namespace`, inheriting backend and prefix.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }
}

/// Configuration for the [`ChangeBridge`](crate::ChangeBridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Only signals whose key starts with this prefix are delivered.
    pub prefix: String,
    /// Strategy used to decode structured payloads.
    pub strategy: CodecStrategy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            strategy: CodecStrategy::Native,
        }
    }
}
