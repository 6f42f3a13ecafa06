//! Subscriber trait and the ordered subscriber list.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::ChangeEvent;

/// Handle returned by [`ChangeBridge::subscribe`](super::ChangeBridge::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Failure raised by a single subscriber. Reported, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriberError {
    /// The subscriber returned an error.
    #[error("subscriber failed: {0}")]
    Failed(String),

    /// The subscriber panicked.
    #[error("subscriber panicked: {0}")]
    Panicked(String),
}

impl SubscriberError {
    /// Builds a [`SubscriberError::Failed`].
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }
}

/// Receives change events from a [`ChangeBridge`](super::ChangeBridge).
///
/// Used as `Arc<dyn ChangeSubscriber>`.
pub trait ChangeSubscriber: Send + Sync {
    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Any error is logged and handed to the bridge's error reporter. It
    /// never reaches other subscribers or the signal source.
    fn on_change(&self, event: &ChangeEvent) -> Result<(), SubscriberError>;
}

/// Adapts an infallible closure.
pub(crate) struct FnSubscriber<F>(pub(crate) F);

impl<F> ChangeSubscriber for FnSubscriber<F>
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) -> Result<(), SubscriberError> {
        (self.0)(event);
        Ok(())
    }
}

/// Subscribers in subscription order.
#[derive(Default)]
pub(crate) struct SubscriberList {
    next_id: u64,
    entries: Vec<(SubscriptionId, Arc<dyn ChangeSubscriber>)>,
}

impl SubscriberList {
    pub(crate) fn add(&mut self, subscriber: Arc<dyn ChangeSubscriber>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push((id, subscriber));
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<(SubscriptionId, Arc<dyn ChangeSubscriber>)> {
        self.entries.clone()
    }
}
