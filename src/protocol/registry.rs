//! # Message Registry
//!
//! The per-process authority that owns all message schemas, their ids, and
//! the derived compatibility hash.
//!
//! Registration happens through `&mut self`, so the ownership system
//! already enforces the lifecycle: schemas can only be added while the host
//! still holds the registry exclusively. Once the registry is shared (via
//! `Arc`) with a client, server, or connection, it is read-only; `freeze`
//! makes that irreversible and explicit, and a later `register` call fails
//! with [`ProtocolError::FrozenRegistry`] even from an exclusive owner.
//!
//! The hash is a SHA-256 digest over the ordered sequence of
//! `(name, fields)` tuples, truncated to 8 bytes. It gates connection
//! admission (peers with different registration sequences never exchange a
//! payload); it is not a cryptographic integrity check.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::codec::{Codec, CodecKind};
use crate::core::frame::{FrameHeader, MAX_PAYLOAD_SIZE};
use crate::core::value::Value;
use crate::error::{ProtocolError, Result};
use crate::protocol::schema::{Message, MessageSchema};

/// Registry of message schemas. See the module docs for the lifecycle.
pub struct MessageRegistry {
    schemas: Vec<Arc<MessageSchema>>,
    by_name: HashMap<String, u16>,
    codec: CodecKind,
    frozen: AtomicBool,
}

impl MessageRegistry {
    /// Empty registry using the default codec.
    pub fn new() -> Self {
        Self::with_codec(CodecKind::default())
    }

    /// Empty registry using an explicitly configured codec.
    pub fn with_codec(codec: CodecKind) -> Self {
        Self {
            schemas: Vec::new(),
            by_name: HashMap::new(),
            codec,
            frozen: AtomicBool::new(false),
        }
    }

    /// Register a message shape under a unique name. Ids are assigned
    /// sequentially in registration order; field order is significant for
    /// both construction arguments and the encoding layout.
    ///
    /// # Errors
    /// `FrozenRegistry` after [`freeze`](Self::freeze), `DuplicateName` if
    /// the name is taken. Either failure leaves the registry unchanged.
    pub fn register(&mut self, name: &str, fields: &[&str]) -> Result<Arc<MessageSchema>> {
        if self.is_frozen() {
            return Err(ProtocolError::FrozenRegistry);
        }
        if self.by_name.contains_key(name) {
            return Err(ProtocolError::DuplicateName(name.to_owned()));
        }
        let id = self.schemas.len() as u16;
        let schema = Arc::new(MessageSchema::new(id, name, fields));
        self.by_name.insert(name.to_owned(), id);
        self.schemas.push(Arc::clone(&schema));
        debug!(name, id, field_count = fields.len(), "schema registered");
        Ok(schema)
    }

    /// Freeze the registry. Idempotent and irreversible; called on the
    /// first connect attempt (client) or at server construction.
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::Relaxed) {
            debug!(schemas = self.schemas.len(), hash = format_args!("{:#018x}", self.hash()), "registry frozen");
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Relaxed)
    }

    /// Codec this registry packs and unpacks with.
    pub fn codec_kind(&self) -> CodecKind {
        self.codec
    }

    /// Compatibility hash over the ordered schema list.
    ///
    /// Two registries given the same registration calls in the same order
    /// always agree; names and field lists are length-prefixed into the
    /// digest, so reordered or renamed fields change it.
    pub fn hash(&self) -> u64 {
        let mut hasher = Sha256::new();
        for schema in &self.schemas {
            hasher.update((schema.name().len() as u32).to_be_bytes());
            hasher.update(schema.name().as_bytes());
            hasher.update((schema.fields().len() as u32).to_be_bytes());
            for field in schema.fields() {
                hasher.update((field.len() as u32).to_be_bytes());
                hasher.update(field.as_bytes());
            }
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }

    /// Look up a schema by name.
    pub fn schema(&self, name: &str) -> Option<&Arc<MessageSchema>> {
        self.by_name.get(name).map(|id| &self.schemas[*id as usize])
    }

    /// Look up a schema by wire id.
    pub fn schema_by_id(&self, id: u16) -> Option<&Arc<MessageSchema>> {
        self.schemas.get(id as usize)
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Build a message instance from positional arguments.
    ///
    /// # Errors
    /// `UnknownMessage` for an unregistered name; `ArgumentCount` when the
    /// argument count does not exactly match the declared field count. The
    /// reported counts refer to declared fields only.
    pub fn construct(&self, name: &str, args: Vec<Value>) -> Result<Message> {
        let schema = self
            .schema(name)
            .ok_or_else(|| ProtocolError::UnknownMessage(name.to_owned()))?;
        if args.len() != schema.fields().len() {
            return Err(ProtocolError::ArgumentCount {
                name: name.to_owned(),
                expected: schema.fields().len(),
                given: args.len(),
            });
        }
        Ok(Message::new(Arc::clone(schema), args))
    }

    /// Encode one message into a wire frame: schema id, payload length,
    /// then the codec-encoded field values in declared order.
    pub fn pack(&self, message: &Message) -> Result<Vec<u8>> {
        let payload = self.codec.codec().encode(message.values())?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::Encode(format!(
                "payload of {} exceeds {MAX_PAYLOAD_SIZE} bytes",
                message.name()
            )));
        }
        let mut buf = BytesMut::with_capacity(payload.len() + 6);
        FrameHeader {
            schema_id: message.schema().id(),
            payload_len: payload.len(),
        }
        .encode(&mut buf);
        buf.extend_from_slice(&payload);
        Ok(buf.to_vec())
    }

    /// Decode every frame concatenated in `data`.
    ///
    /// The returned iterator is finite and non-restartable; it yields
    /// decoded messages until the buffer is exhausted, or a single `Err`
    /// and then nothing. Receivers treat any error as a framing desync:
    /// there is no way to find the next frame boundary after a corrupt
    /// length field, so the connection is torn down rather than resynced.
    pub fn unpack_all<'a>(&'a self, data: &'a [u8]) -> Frames<'a> {
        Frames {
            registry: self,
            buf: data,
            done: false,
        }
    }

    fn unpack_one(&self, buf: &mut &[u8]) -> Result<Message> {
        let header = FrameHeader::parse(buf)?;
        if buf.len() < header.payload_len {
            return Err(ProtocolError::MalformedFrame {
                reason: "truncated frame payload",
                remaining: buf.len(),
            });
        }
        let (payload, rest) = buf.split_at(header.payload_len);
        let schema = self
            .schema_by_id(header.schema_id)
            .ok_or(ProtocolError::UnknownSchemaId(header.schema_id))?;
        let values = self.codec.codec().decode(payload, schema)?;
        *buf = rest;
        Ok(Message::new(Arc::clone(schema), values))
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRegistry")
            .field("schemas", &self.schemas.len())
            .field("codec", &self.codec)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

/// Iterator over the frames in one received buffer. Fused after the first
/// error: a desynced stream has no recoverable continuation.
pub struct Frames<'a> {
    registry: &'a MessageRegistry,
    buf: &'a [u8],
    done: bool,
}

impl Frames<'_> {
    /// Bytes not yet consumed. Lets callers attribute buffer bytes to the
    /// messages decoded from them.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }
}

impl Iterator for Frames<'_> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.buf.is_empty() {
            return None;
        }
        match self.registry.unpack_one(&mut self.buf) {
            Ok(message) => Some(Ok(message)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn demo_registry() -> MessageRegistry {
        let mut registry = MessageRegistry::new();
        registry.register("echo", &["msg"]).unwrap();
        registry.register("move", &["x", "y", "dz"]).unwrap();
        registry
    }

    #[test]
    fn test_sequential_ids_follow_registration_order() {
        let registry = demo_registry();
        assert_eq!(registry.schema("echo").unwrap().id(), 0);
        assert_eq!(registry.schema("move").unwrap().id(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = demo_registry();
        let err = registry.register("echo", &["other"]).unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateName(name) if name == "echo"));
        // Failed registration must not consume an id.
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_after_freeze_rejected() {
        let mut registry = demo_registry();
        registry.freeze();
        registry.freeze(); // idempotent
        assert!(registry.is_frozen());
        let err = registry.register("late", &[]).unwrap_err();
        assert!(matches!(err, ProtocolError::FrozenRegistry));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_hash_deterministic_across_registries() {
        let a = demo_registry();
        let b = demo_registry();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_sensitive_to_schema_set_and_order() {
        let full = demo_registry();

        let mut missing = MessageRegistry::new();
        missing.register("echo", &["msg"]).unwrap();
        assert_ne!(full.hash(), missing.hash());

        let mut reordered_fields = MessageRegistry::new();
        reordered_fields.register("echo", &["msg"]).unwrap();
        reordered_fields.register("move", &["y", "x", "dz"]).unwrap();
        assert_ne!(full.hash(), reordered_fields.hash());

        let mut reordered_schemas = MessageRegistry::new();
        reordered_schemas.register("move", &["x", "y", "dz"]).unwrap();
        reordered_schemas.register("echo", &["msg"]).unwrap();
        assert_ne!(full.hash(), reordered_schemas.hash());
    }

    #[test]
    fn test_hash_not_fooled_by_name_field_boundary() {
        // Same concatenated bytes, different (name, fields) split.
        let mut a = MessageRegistry::new();
        a.register("ab", &["c"]).unwrap();
        let mut b = MessageRegistry::new();
        b.register("a", &["bc"]).unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_construct_arity_errors() {
        let registry = demo_registry();

        let err = registry.construct("echo", vec![]).unwrap_err();
        match err {
            ProtocolError::ArgumentCount {
                name,
                expected,
                given,
            } => {
                assert_eq!(name, "echo");
                assert_eq!(expected, 1);
                assert_eq!(given, 0);
            }
            other => panic!("expected ArgumentCount, got {other:?}"),
        }

        let err = registry
            .construct("echo", vec![Value::Int(1), Value::Int(2)])
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ArgumentCount {
                expected: 1,
                given: 2,
                ..
            }
        ));

        assert!(matches!(
            registry.construct("nope", vec![]).unwrap_err(),
            ProtocolError::UnknownMessage(_)
        ));
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let registry = demo_registry();
        let msg = registry
            .construct("echo", vec![Value::from("hello")])
            .unwrap();
        let bytes = registry.pack(&msg).unwrap();

        let decoded: Vec<_> = registry
            .unpack_all(&bytes)
            .collect::<Result<_>>()
            .expect("unpack");
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0], msg);
        assert_eq!(decoded[0].field("msg").unwrap().as_str(), Some("hello"));
    }

    #[test]
    fn test_unpack_concatenated_frames() {
        let registry = demo_registry();
        let first = registry.construct("echo", vec![Value::from("a")]).unwrap();
        let second = registry
            .construct(
                "move",
                vec![Value::Int(1), Value::Int(2), Value::Float(0.5)],
            )
            .unwrap();
        let mut wire = registry.pack(&first).unwrap();
        wire.extend(registry.pack(&second).unwrap());

        let decoded: Vec<_> = registry
            .unpack_all(&wire)
            .collect::<Result<_>>()
            .expect("unpack");
        assert_eq!(decoded, vec![first, second]);
    }

    #[test]
    fn test_unpack_unknown_schema_id() {
        let registry = demo_registry();
        let mut wire = BytesMut::new();
        FrameHeader {
            schema_id: 42,
            payload_len: 0,
        }
        .encode(&mut wire);

        let mut frames = registry.unpack_all(&wire);
        assert!(matches!(
            frames.next(),
            Some(Err(ProtocolError::UnknownSchemaId(42)))
        ));
        // Fused after the error.
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_unpack_truncated_payload() {
        let registry = demo_registry();
        let msg = registry.construct("echo", vec![Value::from("hi")]).unwrap();
        let wire = registry.pack(&msg).unwrap();

        let mut frames = registry.unpack_all(&wire[..wire.len() - 1]);
        assert!(matches!(
            frames.next(),
            Some(Err(ProtocolError::MalformedFrame { .. }))
        ));
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_codec_choice_respected() {
        let mut registry = MessageRegistry::with_codec(CodecKind::Json);
        registry.register("echo", &["msg"]).unwrap();
        let msg = registry.construct("echo", vec![Value::from("hi")]).unwrap();
        let wire = registry.pack(&msg).unwrap();
        // Past the 6-byte header, the payload is JSON text.
        assert_eq!(&wire[6..7], b"[");
    }
}
