//! Value codec: converts `serde_json::Value` trees to backend strings and back.
//!
//! Strings are stored literally to avoid double encoding. Every other value
//! is tagged with [`STRUCTURED_MARKER`] and serialized with the selected
//! [`CodecStrategy`]. A string that itself starts with the marker is tagged
//! too, so [`Codec::encode`] and [`Codec::decode`] stay mutual inverses.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::compact;
use crate::error::{CodecError, CodecResult};

/// Leading character that marks a payload as structured data.
pub const STRUCTURED_MARKER: char = '\u{2}';

/// Serialization routine used for structured payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecStrategy {
    /// `serde_json`.
    #[default]
    Native,
    /// The compact percent-encoded grammar in [`compact`].
    Fallback,
}

/// Encoder/decoder bound to one [`CodecStrategy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    strategy: CodecStrategy,
}

impl Codec {
    /// Creates a codec using the given strategy.
    #[must_use]
    pub const fn new(strategy: CodecStrategy) -> Self {
        Self { strategy }
    }

    /// Picks the native strategy when the backend supports native structured
    /// serialization, the fallback grammar otherwise.
    #[must_use]
    pub const fn for_capability(native_structured: bool) -> Self {
        if native_structured {
            Self::new(CodecStrategy::Native)
        } else {
            Self::new(CodecStrategy::Fallback)
        }
    }

    /// Returns the strategy this codec uses.
    #[must_use]
    pub const fn strategy(&self) -> CodecStrategy {
        self.strategy
    }

    /// Serializes a value with the strategy alone, without the marker.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if the native routine rejects the value.
    pub fn serialize(&self, value: &Value) -> CodecResult<String> {
        match self.strategy {
            CodecStrategy::Native => Ok(serde_json::to_string(value)?),
            CodecStrategy::Fallback => Ok(compact::stringify(value)),
        }
    }

    /// Parses an untagged structured payload with the strategy alone.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the payload is malformed for the strategy.
    pub fn deserialize(&self, payload: &str) -> CodecResult<Value> {
        match self.strategy {
            CodecStrategy::Native => Ok(serde_json::from_str(payload)?),
            CodecStrategy::Fallback => compact::parse(payload),
        }
    }

    /// Encodes a value for storage in a string-only backend.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the value cannot be serialized.
    pub fn encode(&self, value: &Value) -> CodecResult<String> {
        if let Value::String(text) = value {
            if !text.starts_with(STRUCTURED_MARKER) {
                return Ok(text.clone());
            }
        }
        let mut out = String::from(STRUCTURED_MARKER);
        out.push_str(&self.serialize(value)?);
        Ok(out)
    }

    /// Decodes a payload produced by [`Codec::encode`].
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if a tagged payload is malformed.
    pub fn decode(&self, raw: &str) -> CodecResult<Value> {
        match raw.strip_prefix(STRUCTURED_MARKER) {
            Some(payload) => self.deserialize(payload),
            None => Ok(Value::String(raw.to_string())),
        }
    }

    /// Decodes a payload that may predate the structured marker.
    ///
    /// Tagged payloads decode as in [`Codec::decode`]. Untagged payloads are
    /// tried as plain JSON first and only then taken as opaque text.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] only if a tagged payload is malformed.
    pub fn decode_lenient(&self, raw: &str) -> CodecResult<Value> {
        match raw.strip_prefix(STRUCTURED_MARKER) {
            Some(payload) => self.deserialize(payload),
            None => Ok(serde_json::from_str(raw).unwrap_or_else(|_| {
                tracing::trace!(len = raw.len(), "untagged payload is not json, keeping as text");
                Value::String(raw.to_string())
            })),
        }
    }

    /// Converts any serializable type into a value tree.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NotRepresentable`] for types with no JSON shape,
    /// such as maps with non-string keys.
    pub fn to_value<T: Serialize + ?Sized>(value: &T) -> CodecResult<Value> {
        serde_json::to_value(value).map_err(|err| CodecError::NotRepresentable(err.to_string()))
    }

    /// Converts a value tree into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if the tree does not match `T`.
    pub fn from_value<T: DeserializeOwned>(value: Value) -> CodecResult<T> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            (-1.0e12..1.0e12_f64).prop_map(Value::from),
            "\\PC{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("\\PC{0,8}", inner, 0..6)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn native_round_trip(value in json_value()) {
            let codec = Codec::new(CodecStrategy::Native);
            let encoded = codec.encode(&value).unwrap();
            prop_assert_eq!(codec.decode(&encoded).unwrap(), value);
        }

        #[test]
        fn fallback_round_trip(value in json_value()) {
            let codec = Codec::new(CodecStrategy::Fallback);
            let encoded = codec.encode(&value).unwrap();
            prop_assert_eq!(codec.decode(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn falsy_values_round_trip_with_both_strategies() {
        for codec in [Codec::new(CodecStrategy::Native), Codec::new(CodecStrategy::Fallback)] {
            for value in [json!(0), json!(false), json!(null), json!(""), json!([]), json!({})] {
                let encoded = codec.encode(&value).unwrap();
                assert_eq!(codec.decode(&encoded).unwrap(), value, "{:?}", codec.strategy());
            }
        }
    }

    #[test]
    fn strings_are_stored_literally() {
        let codec = Codec::default();
        assert_eq!(codec.encode(&json!("plain")).unwrap(), "plain");
        assert_eq!(codec.decode("plain").unwrap(), json!("plain"));
    }

    #[test]
    fn structured_values_are_tagged() {
        let codec = Codec::default();
        assert_eq!(codec.encode(&json!(5)).unwrap(), "\u{2}5");
        assert_eq!(codec.encode(&json!({"a": [1]})).unwrap(), "\u{2}{\"a\":[1]}");
    }

    #[test]
    fn string_starting_with_marker_is_tagged() {
        let codec = Codec::default();
        let tricky = json!("\u{2}not structured");
        let encoded = codec.encode(&tricky).unwrap();
        assert_ne!(encoded, "\u{2}not structured");
        assert_eq!(codec.decode(&encoded).unwrap(), tricky);
    }

    #[test]
    fn capability_selects_strategy() {
        assert_eq!(Codec::for_capability(true).strategy(), CodecStrategy::Native);
        assert_eq!(Codec::for_capability(false).strategy(), CodecStrategy::Fallback);
    }

    #[test]
    fn malformed_tagged_payload_is_an_error() {
        let codec = Codec::default();
        assert!(matches!(codec.decode("\u{2}{oops"), Err(CodecError::Json(_))));
        assert!(codec.decode_lenient("\u{2}{oops").is_err());
    }

    #[test]
    fn lenient_decode_accepts_untagged_json_and_text() {
        let codec = Codec::default();
        assert_eq!(codec.decode_lenient("1").unwrap(), json!(1));
        assert_eq!(codec.decode_lenient("{\"n\":1}").unwrap(), json!({"n": 1}));
        assert_eq!(codec.decode_lenient("hello").unwrap(), json!("hello"));
        assert_eq!(codec.decode_lenient("\u{2}[true]").unwrap(), json!([true]));
    }

    #[test]
    fn non_string_map_keys_are_not_representable() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        assert!(matches!(Codec::to_value(&map), Err(CodecError::NotRepresentable(_))));
    }

    #[test]
    fn typed_conversion_round_trips() {
        let value = Codec::to_value(&vec![1_u8, 2, 3]).unwrap();
        let back: Vec<u8> = Codec::from_value(value).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
