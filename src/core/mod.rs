//! # Core Components
//!
//! Leaf concerns beneath the protocol layer: field values, codecs, and the
//! wire frame layout.
//!
//! ## Components
//! - **Value**: self-describing field values carried by messages
//! - **Codec**: pluggable encode/decode of field values (bincode, JSON,
//!   MessagePack)
//! - **Frame**: wire frame header, `[schema id][length][payload]`
//!
//! ## Wire Format
//! ```text
//! [SchemaId(2)] [Length(4)] [Payload(N)]
//! ```
//!
//! Length is validated against a 16MB cap before allocation.

pub mod codec;
pub mod frame;
pub mod value;

pub use codec::{Codec, CodecKind};
pub use value::Value;
