//! Namespaced store engine with a debounced write-back flush.
//!
//! A [`Store`] keeps one namespace's map in memory and mirrors it to a
//! single backend record at `prefix + namespace`. Mutations mark the store
//! dirty and, if no flush is pending, schedule one after the flush delay.
//! Further mutations inside that window ride along with the pending flush,
//! so a burst of writes costs one serialization and one backend write.
//!
//! The in-memory map is always the most current view. The backend record
//! lags it by at most one flush delay, except right after
//! [`Store::flush`] or [`Store::destroy`].

mod env;

pub use env::StoreEnv;

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use diskstore_core::{Codec, CodecStrategy};
use parking_lot::{Mutex, ReentrantMutex};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::backend::{BackendKind, BackendRegistry, StorageBackend};
use crate::config::{CloneOptions, StoreOptions};
use crate::error::{StoreError, StoreResult};
use crate::scheduler::TaskHandle;
use crate::teardown::Flushable;

struct StoreState {
    data: Map<String, Value>,
    dirty: bool,
    pending: Option<TaskHandle>,
    /// Bumped on every mutation.
    revision: u64,
    /// Revision of the newest snapshot written to the backend.
    persisted: u64,
}

struct StoreInner {
    namespace: String,
    prefix: String,
    kind: BackendKind,
    physical_key: String,
    flush_delay: Duration,
    strict_load: bool,
    backend: Arc<dyn StorageBackend>,
    codec: Codec,
    env: StoreEnv,
    state: Mutex<StoreState>,
    /// Serializes backend writes. Reentrant so a signal listener running
    /// inside `backend.set` may flush this store again.
    flush_lock: ReentrantMutex<()>,
    weak_self: Weak<StoreInner>,
}

impl StoreInner {
    /// Marks the store dirty and schedules a flush unless one is pending.
    fn mark_dirty(&self, state: &mut StoreState) {
        state.dirty = true;
        state.revision += 1;
        if state.pending.is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        let handle = self.env.scheduler.schedule_once(
            self.flush_delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    if let Err(err) = inner.flush() {
                        warn!(key = %inner.physical_key, error = %err, "deferred flush failed");
                    }
                }
            }),
        );
        debug!(key = %self.physical_key, delay = ?self.flush_delay, "flush scheduled");
        state.pending = Some(handle);
    }

    fn flush(&self) -> StoreResult<()> {
        let _writer = self.flush_lock.lock();
        loop {
            let (encoded, revision) = {
                let mut state = self.state.lock();
                if let Some(handle) = state.pending.take() {
                    handle.cancel();
                }
                if !state.dirty {
                    return Ok(());
                }
                let encoded = self.codec.encode(&Value::Object(state.data.clone()))?;
                state.dirty = false;
                (encoded, state.revision)
            };
            // The state lock is released so signal listeners on a shared
            // backend may read or mutate this store while the write propagates.
            if let Err(err) = self.backend.set(&self.physical_key, &encoded) {
                self.state.lock().dirty = true;
                return Err(err.into());
            }
            let mut state = self.state.lock();
            if state.persisted > revision {
                // A nested flush wrote a newer snapshot that this write just
                // replaced. Write the current map again.
                debug!(key = %self.physical_key, revision, "stale snapshot overwrote newer record");
                state.dirty = true;
                continue;
            }
            state.persisted = revision;
            debug!(key = %self.physical_key, bytes = encoded.len(), revision, "flushed");
            return Ok(());
        }
    }
}

impl Flushable for StoreInner {
    fn label(&self) -> String {
        format!("{}:{}", self.kind, self.physical_key)
    }

    fn teardown_flush(&self) -> StoreResult<bool> {
        let was_dirty = self.state.lock().dirty;
        self.flush()?;
        Ok(was_dirty)
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(handle) = state.pending.take() {
            handle.cancel();
        }
        if !state.dirty {
            return;
        }
        let data = std::mem::take(&mut state.data);
        let result = self
            .codec
            .encode(&Value::Object(data))
            .map_err(StoreError::from)
            .and_then(|encoded| {
                self.backend
                    .set(&self.physical_key, &encoded)
                    .map_err(StoreError::from)
            });
        if let Err(err) = result {
            warn!(key = %self.physical_key, error = %err, "flush on drop failed");
        }
    }
}

/// Reads and decodes the record at `key`.
///
/// Returns `None` when the key is absent, or when the record cannot be
/// decoded and `strict` is off.
fn read_record(
    backend: &dyn StorageBackend,
    codec: &Codec,
    key: &str,
    strict: bool,
) -> StoreResult<Option<Map<String, Value>>> {
    let Some(raw) = backend.get(key) else {
        return Ok(None);
    };
    match decode_record(codec, &raw) {
        Ok(map) => Ok(Some(map)),
        Err(reason) if strict => Err(StoreError::CorruptRecord {
            key: key.to_string(),
            reason,
        }),
        Err(reason) => {
            warn!(key, %reason, "discarding undecodable record");
            Ok(None)
        }
    }
}

/// Decodes a persisted record into a map, describing why it failed if not.
fn decode_record(codec: &Codec, raw: &str) -> Result<Map<String, Value>, String> {
    match codec.decode_lenient(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Array(_)) => Err("expected an object, found an array".to_string()),
        Ok(Value::String(_)) => Err("expected an object, found text".to_string()),
        Ok(_) => Err("expected an object, found a scalar".to_string()),
        Err(err) => Err(err.to_string()),
    }
}

/// One namespace of structured data, persisted to a string-only backend.
///
/// Every method is synchronous. Mutating methods return `&Self` so calls
/// can be chained.
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Opens the store described by `options`.
    ///
    /// Loads any existing record for the namespace. A missing record yields
    /// an empty map, as does a record that fails to decode unless
    /// `strict_load` is set. When `import_key` names a decodable backend
    /// record, its data is adopted instead, the key is removed, and a flush
    /// is scheduled to rewrite the data under the namespace key. A missing or
    /// undecodable import record falls back to the namespace record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptRecord`] in strict mode when the import
    /// or namespace record cannot be decoded.
    pub fn open(options: StoreOptions, env: &StoreEnv) -> StoreResult<Self> {
        let namespace = options.effective_namespace().to_string();
        let prefix = options.effective_prefix().to_string();
        let physical_key = format!("{prefix}{namespace}");
        let backend = env.backends.resolve(options.backend);
        let codec = Codec::for_capability(backend.capabilities().native_structured);

        let imported = match options.import_key.as_deref() {
            Some(key) => read_record(&*backend, &codec, key, options.strict_load)?
                .map(|map| (key, map)),
            None => None,
        };
        let adopted = imported.is_some();
        let data = match imported {
            Some((key, map)) => {
                backend.remove(key);
                debug!(from = %key, to = %physical_key, "imported record");
                map
            }
            None => read_record(&*backend, &codec, &physical_key, options.strict_load)?
                .unwrap_or_default(),
        };

        let inner = Arc::new_cyclic(|weak_self| StoreInner {
            namespace,
            prefix,
            kind: options.backend,
            physical_key,
            flush_delay: options.flush_delay,
            strict_load: options.strict_load,
            backend,
            codec,
            env: env.clone(),
            state: Mutex::new(StoreState {
                data,
                dirty: false,
                pending: None,
                revision: 0,
                persisted: 0,
            }),
            flush_lock: ReentrantMutex::new(()),
            weak_self: weak_self.clone(),
        });
        env.teardown
            .register(Arc::downgrade(&inner) as Weak<dyn Flushable>);
        if adopted {
            let mut state = inner.state.lock();
            inner.mark_dirty(&mut state);
        }
        Ok(Self { inner })
    }

    /// Returns `true` if every backend in `backends` is usable.
    #[must_use]
    pub fn is_supported(backends: &BackendRegistry) -> bool {
        backends.is_supported()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> &Self {
        let mut state = self.inner.state.lock();
        state.data.insert(key.into(), value.into());
        self.inner.mark_dirty(&mut state);
        self
    }

    /// Stores any serializable value under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if `value` has no JSON shape.
    /// The store is left untouched in that case.
    pub fn set_serialized<T: Serialize + ?Sized>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> StoreResult<&Self> {
        let value = Codec::to_value(value)?;
        Ok(self.set(key, value))
    }

    /// Returns a copy of the value under `key`, or `None` if never set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.state.lock().data.get(key).cloned()
    }

    /// Returns the value under `key` converted to `T`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the stored value does not
    /// match `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        Ok(self.get(key).map(Codec::from_value::<T>).transpose()?)
    }

    /// Returns `true` if `key` is present, even when its value is `null`.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.inner.state.lock().data.contains_key(key)
    }

    /// Removes `key`. Absent keys are not an error.
    pub fn remove(&self, key: &str) -> &Self {
        let mut state = self.inner.state.lock();
        state.data.remove(key);
        self.inner.mark_dirty(&mut state);
        self
    }

    /// Removes every key. The backend is only touched by the next flush.
    pub fn clear(&self) -> &Self {
        let mut state = self.inner.state.lock();
        state.data = Map::new();
        self.inner.mark_dirty(&mut state);
        self
    }

    /// Replaces the whole map with a copy of `data`.
    pub fn load(&self, data: &Map<String, Value>) -> &Self {
        let copy = data.clone();
        let mut state = self.inner.state.lock();
        state.data = copy;
        self.inner.mark_dirty(&mut state);
        self
    }

    /// Returns a deep, independent copy of the map.
    #[must_use]
    pub fn export(&self) -> Map<String, Value> {
        self.inner.state.lock().data.clone()
    }

    /// Number of keys.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.state.lock().data.len()
    }

    /// Returns `true` if the map has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().data.is_empty()
    }

    /// Returns every key.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.state.lock().data.keys().cloned().collect()
    }

    /// Calls `f` for every entry of a snapshot of the map.
    ///
    /// The snapshot is taken up front, so `f` may use the store freely.
    pub fn for_each<F: FnMut(&str, &Value)>(&self, mut f: F) {
        for (key, value) in &self.export() {
            f(key, value);
        }
    }

    /// Writes the map to the backend if it is dirty.
    ///
    /// Cancels any pending scheduled flush. Calling it on a clean store does
    /// nothing, so it is safe from both the scheduler and teardown paths.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QuotaExceeded`] if the backend is full, or
    /// [`StoreError::Serialization`] if the map cannot be encoded. The store
    /// stays dirty and is not retried automatically.
    pub fn flush(&self) -> StoreResult<&Self> {
        self.inner.flush()?;
        Ok(self)
    }

    /// Opens a new store in `namespace` seeded with a copy of this map.
    ///
    /// `backend` defaults to this store's backend kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NamespaceCollision`] if the target is this
    /// store's own identity.
    pub fn clone_as(&self, namespace: &str, backend: Option<BackendKind>) -> StoreResult<Self> {
        self.clone_with(CloneOptions {
            namespace: namespace.to_string(),
            backend,
            prefix: None,
        })
    }

    /// Opens a new store at the identity in `options`, seeded with a copy of
    /// this map. Unset fields and an empty namespace inherit this store's
    /// identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NamespaceCollision`] if the target resolves to
    /// this store's backend kind and physical key. Nothing is mutated then.
    pub fn clone_with(&self, options: CloneOptions) -> StoreResult<Self> {
        let namespace = if options.namespace.is_empty() {
            self.inner.namespace.clone()
        } else {
            options.namespace
        };
        let target = StoreOptions {
            namespace,
            backend: options.backend.unwrap_or(self.inner.kind),
            prefix: options.prefix.unwrap_or_else(|| self.inner.prefix.clone()),
            flush_delay: self.inner.flush_delay,
            import_key: None,
            strict_load: self.inner.strict_load,
        };
        let target_key = format!(
            "{}{}",
            target.effective_prefix(),
            target.effective_namespace()
        );
        if target.backend == self.inner.kind && target_key == self.inner.physical_key {
            return Err(StoreError::NamespaceCollision {
                namespace: target.effective_namespace().to_string(),
                backend: target.backend,
            });
        }

        let snapshot = self.export();
        let cloned = Self::open(target, &self.inner.env)?;
        cloned.load(&snapshot);
        Ok(cloned)
    }

    /// Empties the map and erases the backend record.
    ///
    /// Cancels any pending flush so the record is not written back. The store
    /// stays usable; the next mutation recreates the record.
    pub fn destroy(&self) -> &Self {
        let _writer = self.inner.flush_lock.lock();
        {
            let mut state = self.inner.state.lock();
            if let Some(handle) = state.pending.take() {
                handle.cancel();
            }
            state.data = Map::new();
            state.dirty = false;
        }
        self.inner.backend.remove(&self.inner.physical_key);
        debug!(key = %self.inner.physical_key, "destroyed");
        self
    }

    /// Logical namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Physical key prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Backend kind the record lives in.
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.inner.kind
    }

    /// Backend key holding the record.
    #[must_use]
    pub fn physical_key(&self) -> &str {
        &self.inner.physical_key
    }

    /// Debounce interval.
    #[must_use]
    pub fn flush_delay(&self) -> Duration {
        self.inner.flush_delay
    }

    /// Codec strategy picked from the backend's capabilities.
    #[must_use]
    pub fn codec_strategy(&self) -> CodecStrategy {
        self.inner.codec.strategy()
    }

    /// Returns `true` if the map has changes not yet written.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    /// Returns `true` while a scheduled flush is outstanding.
    #[must_use]
    pub fn has_pending_flush(&self) -> bool {
        self.inner
            .state
            .lock()
            .pending
            .as_ref()
            .is_some_and(TaskHandle::is_pending)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Store")
            .field("backend", &self.inner.kind)
            .field("key", &self.inner.physical_key)
            .field("size", &state.data.len())
            .field("dirty", &state.dirty)
            .finish()
    }
}
