//! Error types for the store engine.
//!
//! All fallible store operations return [`StoreError`] via [`StoreResult`].

use diskstore_core::CodecError;
use thiserror::Error;

use crate::backend::{BackendError, BackendKind};

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the store engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The codec could not represent or parse a value.
    #[error("serialization error: {0}")]
    Serialization(#[from] CodecError),

    /// The backend rejected a write because it is full.
    #[error("quota exceeded writing {key}: {attempted} bytes over a limit of {limit}")]
    QuotaExceeded {
        key: String,
        attempted: usize,
        limit: usize,
    },

    /// A clone targeted the source store's own identity.
    #[error("cannot clone store onto its own identity {backend}:{namespace}")]
    NamespaceCollision {
        namespace: String,
        backend: BackendKind,
    },

    /// A persisted record failed to decode. Only raised in strict mode.
    #[error("corrupt record at {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    /// Any other backend failure, passed through unchanged.
    #[error("backend error: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::QuotaExceeded {
                key,
                attempted,
                limit,
            } => Self::QuotaExceeded {
                key,
                attempted,
                limit,
            },
            other => Self::Backend(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_errors_keep_their_own_variant() {
        let err: StoreError = BackendError::QuotaExceeded {
            key: "DStodefault".to_string(),
            attempted: 120,
            limit: 100,
        }
        .into();
        assert!(matches!(
            err,
            StoreError::QuotaExceeded {
                attempted: 120,
                limit: 100,
                ..
            }
        ));
    }

    #[test]
    fn other_backend_errors_pass_through() {
        let err: StoreError = BackendError::Unavailable("disabled".to_string()).into();
        assert!(matches!(
            err,
            StoreError::Backend(BackendError::Unavailable(ref reason)) if reason == "disabled"
        ));
    }

    #[test]
    fn collision_message_names_identity() {
        let err = StoreError::NamespaceCollision {
            namespace: "prefs".to_string(),
            backend: BackendKind::Ephemeral,
        };
        assert_eq!(
            err.to_string(),
            "cannot clone store onto its own identity ephemeral:prefs"
        );
    }
}
