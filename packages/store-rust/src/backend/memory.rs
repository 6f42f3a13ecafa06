//! In-memory [`StorageBackend`] with an optional byte quota.
//!
//! Keys enumerate in sorted order. The quota counts the UTF-8 bytes of every
//! key and value, which stands in for the character budget browsers apply.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{BackendCapabilities, BackendError, StorageBackend};

/// In-memory backend guarded by a [`RwLock`].
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
    available: bool,
    capabilities: BackendCapabilities,
    writes: AtomicU64,
}

impl MemoryBackend {
    /// Creates an empty, unbounded backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            quota_bytes: None,
            available: true,
            capabilities: BackendCapabilities::default(),
            writes: AtomicU64::new(0),
        }
    }

    /// Creates a backend that rejects writes pushing the total past `bytes`.
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota_bytes: Some(bytes),
            ..Self::new()
        }
    }

    /// Creates a backend whose probe reports it unusable. Writes fail with
    /// [`BackendError::Unavailable`].
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Reports no native structured serialization, so stores on this
    /// backend use the compact fallback codec.
    #[must_use]
    pub fn without_native_structured(mut self) -> Self {
        self.capabilities.native_structured = false;
        self
    }

    /// Number of successful `set` calls since creation.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Total bytes of all keys and values.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        if !self.available {
            return Err(BackendError::Unavailable("memory backend disabled".to_string()));
        }
        let mut entries = self.entries.write();
        if let Some(limit) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let attempted = others + key.len() + value.len();
            if attempted > limit {
                return Err(BackendError::QuotaExceeded {
                    key: key.to_string(),
                    attempted,
                    limit,
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn key_at(&self, index: usize) -> Option<String> {
        self.entries.read().keys().nth(index).cloned()
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_round_trip() {
        let backend = MemoryBackend::new();
        assert!(backend.get("k").is_none());

        backend.set("k", "v").unwrap();
        assert_eq!(backend.get("k").as_deref(), Some("v"));
        assert_eq!(backend.len(), 1);

        backend.remove("k");
        assert!(backend.get("k").is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn remove_missing_key_is_noop() {
        let backend = MemoryBackend::new();
        backend.remove("absent");
        assert_eq!(backend.len(), 0);
    }

    #[test]
    fn clear_removes_everything() {
        let backend = MemoryBackend::new();
        backend.set("a", "1").unwrap();
        backend.set("b", "2").unwrap();
        backend.clear();
        assert!(backend.is_empty());
    }

    #[test]
    fn key_at_enumerates_in_sorted_order() {
        let backend = MemoryBackend::new();
        backend.set("m", "").unwrap();
        backend.set("a", "").unwrap();
        backend.set("z", "").unwrap();
        assert_eq!(backend.key_at(0).as_deref(), Some("a"));
        assert_eq!(backend.key_at(2).as_deref(), Some("z"));
        assert!(backend.key_at(3).is_none());
    }

    #[test]
    fn quota_rejects_oversized_writes_and_keeps_old_value() {
        let backend = MemoryBackend::with_quota(10);
        backend.set("k", "12345").unwrap();

        let err = backend.set("k", "1234567890").unwrap_err();
        assert_eq!(
            err,
            BackendError::QuotaExceeded {
                key: "k".to_string(),
                attempted: 11,
                limit: 10,
            }
        );
        assert_eq!(backend.get("k").as_deref(), Some("12345"));
        assert_eq!(backend.write_count(), 1);
    }

    #[test]
    fn quota_counts_replaced_value_once() {
        let backend = MemoryBackend::with_quota(6);
        backend.set("k", "aaaaa").unwrap();
        // Replacing the value must not count the old one.
        backend.set("k", "bbbbb").unwrap();
        assert_eq!(backend.used_bytes(), 6);
    }

    #[test]
    fn unavailable_backend_rejects_writes() {
        let backend = MemoryBackend::unavailable();
        assert!(!backend.is_available());
        assert!(matches!(
            backend.set("k", "v"),
            Err(BackendError::Unavailable(_))
        ));
    }

    #[test]
    fn capability_can_disable_native_structured() {
        assert!(MemoryBackend::new().capabilities().native_structured);
        assert!(
            !MemoryBackend::new()
                .without_native_structured()
                .capabilities()
                .native_structured
        );
    }
}
