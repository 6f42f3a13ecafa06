//! Error types for the value codec.

use thiserror::Error;

/// Alias for `Result<T, CodecError>`.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding or decoding a value.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The native JSON routine rejected the input.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The compact grammar found a character it did not expect.
    #[error("unexpected character {found:?} at position {pos}")]
    UnexpectedChar { pos: usize, found: char },

    /// The compact grammar ran out of input in the middle of a value.
    #[error("unexpected end of input at position {pos}")]
    UnexpectedEnd { pos: usize },

    /// A `%` escape was truncated or not followed by two hex digits.
    #[error("invalid percent escape at byte {pos}")]
    InvalidPercentEncoding { pos: usize },

    /// Percent-decoded bytes were not valid UTF-8.
    #[error("percent-decoded payload is not valid utf-8")]
    InvalidUtf8,

    /// The value cannot be represented by the codec.
    #[error("value not representable: {0}")]
    NotRepresentable(String),
}
