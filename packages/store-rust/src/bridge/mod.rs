//! Change notifications from other execution contexts.
//!
//! A [`ChangeBridge`] installs a single listener on a [`SignalSource`] the
//! first time anyone subscribes. Each signal whose key carries the configured
//! prefix becomes a [`ChangeEvent`] with decoded old and new values and the
//! prefix stripped. Subscribers run in subscription order; a subscriber that
//! fails or panics is reported and skipped, never propagated.

mod subscriber;

pub use subscriber::{ChangeSubscriber, SubscriberError, SubscriptionId};

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Once, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use diskstore_core::Codec;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::signal::{ContextId, SignalSource, StorageSignal};
use subscriber::{FnSubscriber, SubscriberList};

/// Returns the current wall-clock time as milliseconds since the Unix epoch.
#[allow(clippy::cast_possible_truncation)]
fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// One backend change made by another context.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// When the bridge received the signal, in Unix milliseconds.
    pub timestamp: i64,
    /// Key with the bridge prefix removed, i.e. the store namespace.
    pub key: String,
    /// Decoded value before the change. `None` if the key was absent.
    pub old_value: Option<Value>,
    /// Decoded value after the change. `None` if the key was removed.
    pub new_value: Option<Value>,
    /// Context that made the change.
    pub source_context: ContextId,
    /// The signal as the source delivered it.
    pub raw_signal: StorageSignal,
}

/// Outcome of delivering one event.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Subscribers that handled the event.
    pub delivered: usize,
    /// Subscribers that failed, in delivery order.
    pub failures: Vec<(SubscriptionId, SubscriberError)>,
}

/// Callback told about every subscriber failure.
pub type ErrorReporter = Arc<dyn Fn(SubscriptionId, &SubscriberError) + Send + Sync>;

struct BridgeInner {
    source: Arc<dyn SignalSource>,
    prefix: String,
    codec: Codec,
    subscribers: RwLock<SubscriberList>,
    reporter: RwLock<Option<ErrorReporter>>,
    install: Once,
}

impl BridgeInner {
    fn decode(&self, raw: &str) -> Value {
        self.codec.decode_lenient(raw).unwrap_or_else(|err| {
            debug!(error = %err, "undecodable change payload kept as text");
            Value::String(raw.to_string())
        })
    }

    fn dispatch(&self, signal: &StorageSignal) -> Option<DeliveryReport> {
        let key = signal.key.strip_prefix(self.prefix.as_str())?;
        let event = ChangeEvent {
            timestamp: now_millis(),
            key: key.to_string(),
            old_value: signal.old_value.as_deref().map(|raw| self.decode(raw)),
            new_value: signal.new_value.as_deref().map(|raw| self.decode(raw)),
            source_context: signal.origin,
            raw_signal: signal.clone(),
        };

        // Snapshot so subscribers may subscribe or unsubscribe while running.
        let subscribers = self.subscribers.read().snapshot();
        let mut report = DeliveryReport::default();
        for (id, subscriber) in subscribers {
            let outcome = catch_unwind(AssertUnwindSafe(|| subscriber.on_change(&event)))
                .unwrap_or_else(|payload| Err(SubscriberError::from_panic(payload.as_ref())));
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(subscription = %id, key = %event.key, error = %err, "subscriber failed");
                    let reporter = self.reporter.read().clone();
                    if let Some(reporter) = reporter {
                        reporter(id, &err);
                    }
                    report.failures.push((id, err));
                }
            }
        }
        Some(report)
    }
}

static GLOBAL: OnceLock<ChangeBridge> = OnceLock::new();

/// Fans signals from one [`SignalSource`] out to subscribers.
///
/// Cheap to clone; clones share subscribers and the installed listener.
#[derive(Clone)]
pub struct ChangeBridge {
    inner: Arc<BridgeInner>,
}

impl ChangeBridge {
    /// Creates a bridge over `source`. Nothing is installed on the source
    /// until the first subscription.
    #[must_use]
    pub fn new(source: Arc<dyn SignalSource>, config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                source,
                prefix: config.prefix,
                codec: Codec::new(config.strategy),
                subscribers: RwLock::new(SubscriberList::default()),
                reporter: RwLock::new(None),
                install: Once::new(),
            }),
        }
    }

    /// Installs `bridge` as the process-wide bridge.
    ///
    /// # Errors
    ///
    /// Returns `bridge` back if a global bridge is already installed.
    pub fn install_global(bridge: Self) -> Result<(), Self> {
        GLOBAL.set(bridge)
    }

    /// Returns the process-wide bridge, if installed.
    #[must_use]
    pub fn global() -> Option<&'static Self> {
        GLOBAL.get()
    }

    /// Subscribes a closure. It stays subscribed until removed.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe_with(Arc::new(FnSubscriber(callback)))
    }

    /// Subscribes a fallible subscriber.
    pub fn subscribe_with(&self, subscriber: Arc<dyn ChangeSubscriber>) -> SubscriptionId {
        let id = self.inner.subscribers.write().add(subscriber);
        self.ensure_listening();
        id
    }

    /// Removes one subscriber. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.write().remove(id)
    }

    /// Removes every subscriber, returning how many there were.
    ///
    /// The source listener stays installed and simply has no one to call.
    pub fn unsubscribe_all(&self) -> usize {
        self.inner.subscribers.write().clear()
    }

    /// Number of current subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Returns `true` once the source listener has been installed.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.inner.install.is_completed()
    }

    /// Prefix a signal key must carry to be delivered.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Sets the callback told about every subscriber failure.
    pub fn set_error_reporter<F>(&self, reporter: F)
    where
        F: Fn(SubscriptionId, &SubscriberError) + Send + Sync + 'static,
    {
        *self.inner.reporter.write() = Some(Arc::new(reporter));
    }

    /// Delivers `signal` to every subscriber.
    ///
    /// This is what the installed listener calls. Returns `None` when the
    /// signal's key lacks the prefix and nothing was delivered.
    pub fn dispatch(&self, signal: &StorageSignal) -> Option<DeliveryReport> {
        self.inner.dispatch(signal)
    }

    fn ensure_listening(&self) {
        self.inner.install.call_once(|| {
            // Weak so the source's listener does not keep the bridge alive.
            let weak = Arc::downgrade(&self.inner);
            self.inner
                .source
                .listen(Arc::new(move |signal: &StorageSignal| {
                    if let Some(inner) = weak.upgrade() {
                        inner.dispatch(signal);
                    }
                }));
            debug!(prefix = %self.inner.prefix, "change listener installed");
        });
    }
}

impl fmt::Debug for ChangeBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBridge")
            .field("prefix", &self.inner.prefix)
            .field("subscribers", &self.subscriber_count())
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}
