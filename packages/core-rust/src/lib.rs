//! `diskstore` core: the value codec shared by the store engine and the
//! change notification bridge.
//!
//! Values are `serde_json::Value` trees. A [`Codec`] turns them into backend
//! strings and back using one of two [`CodecStrategy`] variants.

pub mod codec;
pub mod compact;
pub mod error;
pub mod percent;

pub use codec::{Codec, CodecStrategy, STRUCTURED_MARKER};
pub use error::{CodecError, CodecResult};
pub use serde_json::{Map, Value};
