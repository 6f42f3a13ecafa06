//! `diskstore`: a durable, namespaced object store over synchronous,
//! string-only key-value backends.
//!
//! The crate is layered leaf-to-root:
//!
//! - [`backend`]: the physical [`StorageBackend`] capability and in-memory
//!   implementations, including a multi-context simulation that raises
//!   [`StorageSignal`]s.
//! - [`scheduler`]: single-shot deferred tasks used by the debounced flush.
//! - [`store`]: the [`Store`] engine that keeps one namespace in memory and
//!   mirrors it to the backend.
//! - [`teardown`]: the last-chance flush hook.
//! - [`bridge`]: the [`ChangeBridge`] that turns signals from other contexts
//!   into [`ChangeEvent`]s for subscribers.

pub mod backend;
pub mod bridge;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod signal;
pub mod store;
pub mod teardown;

pub use backend::{BackendCapabilities, BackendError, BackendKind, BackendRegistry, StorageBackend};
pub use bridge::{
    ChangeBridge, ChangeEvent, ChangeSubscriber, DeliveryReport, ErrorReporter, SubscriberError,
    SubscriptionId,
};
pub use config::{BridgeConfig, CloneOptions, StoreOptions};
pub use diskstore_core::{Codec, CodecError, CodecStrategy, Map, Value};
pub use error::{StoreError, StoreResult};
pub use scheduler::{ManualScheduler, Scheduler, TaskHandle, TokioScheduler};
pub use signal::{ContextId, SignalHub, SignalSource, StorageSignal};
pub use store::{Store, StoreEnv};
pub use teardown::{LifecycleState, TeardownController, TeardownReport};
