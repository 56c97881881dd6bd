//! # Codec Layer
//!
//! Pluggable encoding of message field values to and from bytes.
//!
//! Three codecs are provided: Bincode (default, fastest), JSON
//! (human-readable, debugging/interop) and MessagePack (compact binary).
//! The codec is a pure configuration decision made once at startup via
//! [`CodecKind`]; it is not part of the protocol state machine, and both
//! peers must be configured with the same kind.
//!
//! Contract: `decode(encode(values), schema)` is value-equal to `values`
//! for every value representable by the schema's field set.

use serde::{Deserialize, Serialize};

use crate::core::value::Value;
use crate::error::{ProtocolError, Result};
use crate::protocol::schema::MessageSchema;

/// Encode/decode of a message's field values.
///
/// The payload is always the full ordered field list of one message;
/// framing (schema id, payload length) lives a layer above in
/// [`crate::protocol::registry::MessageRegistry`].
pub trait Codec {
    /// Encode field values in declared order.
    fn encode(&self, values: &[Value]) -> Result<Vec<u8>>;

    /// Decode a payload against `schema`, checking that the decoded value
    /// count matches the schema's declared field count.
    fn decode(&self, data: &[u8], schema: &MessageSchema) -> Result<Vec<Value>>;

    /// Human-readable codec name for logs.
    fn name(&self) -> &'static str;
}

/// Supported codec implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Binary compact format (default, fastest)
    #[default]
    Bincode,
    /// Human-readable JSON format (debugging, interop)
    Json,
    /// Compact binary format (MessagePack, efficient)
    MessagePack,
}

impl CodecKind {
    /// Resolve the codec implementation. Called once at configuration
    /// time; the returned codec is used for the lifetime of the process.
    pub fn codec(self) -> &'static dyn Codec {
        match self {
            CodecKind::Bincode => &BincodeCodec,
            CodecKind::Json => &JsonCodec,
            CodecKind::MessagePack => &MessagePackCodec,
        }
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        self.codec().name()
    }
}

fn check_arity(values: Vec<Value>, schema: &MessageSchema) -> Result<Vec<Value>> {
    if values.len() != schema.fields().len() {
        return Err(ProtocolError::MalformedFrame {
            reason: "decoded field count does not match schema",
            remaining: 0,
        });
    }
    Ok(values)
}

/// Bincode codec (default).
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode(&self, values: &[Value]) -> Result<Vec<u8>> {
        bincode::serialize(values).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    fn decode(&self, data: &[u8], schema: &MessageSchema) -> Result<Vec<Value>> {
        let values: Vec<Value> =
            bincode::deserialize(data).map_err(|e| ProtocolError::Decode(e.to_string()))?;
        check_arity(values, schema)
    }

    fn name(&self) -> &'static str {
        "bincode"
    }
}

/// JSON codec for debugging and interop.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, values: &[Value]) -> Result<Vec<u8>> {
        serde_json::to_vec(values).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    fn decode(&self, data: &[u8], schema: &MessageSchema) -> Result<Vec<Value>> {
        let values: Vec<Value> =
            serde_json::from_slice(data).map_err(|e| ProtocolError::Decode(e.to_string()))?;
        check_arity(values, schema)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// MessagePack codec for bandwidth-constrained links.
pub struct MessagePackCodec;

impl Codec for MessagePackCodec {
    fn encode(&self, values: &[Value]) -> Result<Vec<u8>> {
        rmp_serde::to_vec(values).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    fn decode(&self, data: &[u8], schema: &MessageSchema) -> Result<Vec<Value>> {
        let values: Vec<Value> =
            rmp_serde::from_slice(data).map_err(|e| ProtocolError::Decode(e.to_string()))?;
        check_arity(values, schema)
    }

    fn name(&self) -> &'static str {
        "msgpack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::schema::MessageSchema;

    fn sample_values() -> Vec<Value> {
        vec![
            Value::Str("hello".into()),
            Value::Int(-42),
            Value::Float(2.25),
            Value::Bool(true),
            Value::Bytes(vec![0x00, 0xFF, 0x7E]),
            Value::List(vec![Value::Int(1), Value::Str("two".into())]),
        ]
    }

    fn sample_schema() -> MessageSchema {
        MessageSchema::new(0, "sample", &["a", "b", "c", "d", "e", "f"])
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_roundtrip_all_codecs() {
        let schema = sample_schema();
        let values = sample_values();
        for kind in [CodecKind::Bincode, CodecKind::Json, CodecKind::MessagePack] {
            let codec = kind.codec();
            let bytes = codec.encode(&values).expect("encode");
            let back = codec.decode(&bytes, &schema).expect("decode");
            assert_eq!(values, back, "{} must round-trip", codec.name());
        }
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_json_distinguishes_int_and_float() {
        let schema = MessageSchema::new(0, "nums", &["i", "f"]);
        let values = vec![Value::Int(3), Value::Float(3.0)];
        let bytes = JsonCodec.encode(&values).expect("encode");
        let back = JsonCodec.decode(&bytes, &schema).expect("decode");
        assert_eq!(back[0], Value::Int(3));
        assert_eq!(back[1], Value::Float(3.0));
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_decode_field_count_mismatch() {
        let schema = MessageSchema::new(0, "pair", &["a", "b"]);
        let bytes = BincodeCodec.encode(&[Value::Int(1)]).expect("encode");
        let err = BincodeCodec.decode(&bytes, &schema).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame { .. }));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let schema = MessageSchema::new(0, "x", &["a"]);
        assert!(JsonCodec.decode(b"{not json", &schema).is_err());
        assert!(MessagePackCodec.decode(&[0xC1], &schema).is_err());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(CodecKind::Bincode.name(), "bincode");
        assert_eq!(CodecKind::Json.name(), "json");
        assert_eq!(CodecKind::MessagePack.name(), "msgpack");
        assert_eq!(CodecKind::default(), CodecKind::Bincode);
    }
}
