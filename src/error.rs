//! # Error Types
//!
//! Error handling for the message protocol layer.
//!
//! Every variant carries enough structured detail (expected/given counts,
//! hash values, offending schema id) to be logged without string-parsing.
//!
//! ## Error Categories
//! - **Registration errors**: frozen registry, duplicate names — fatal to
//!   the registration call only
//! - **Construction errors**: wrong arity, unknown name — surfaced
//!   synchronously to the caller, recoverable
//! - **Decode errors**: unknown schema id, malformed frame — protocol
//!   violations that force the offending connection down
//! - **Negotiation errors**: registry hash mismatch — the connection is
//!   refused before it ever reaches `Connected`

use std::io;
use thiserror::Error;

/// Primary error type for all protocol operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("registry is frozen, no further registration permitted")]
    FrozenRegistry,

    #[error("message name already registered: {0}")]
    DuplicateName(String),

    #[error("message `{name}` takes {expected} arguments ({given} given)")]
    ArgumentCount {
        name: String,
        expected: usize,
        given: usize,
    },

    #[error("unknown message name: {0}")]
    UnknownMessage(String),

    #[error("unknown schema id {0} in frame")]
    UnknownSchemaId(u16),

    #[error("malformed frame: {reason} ({remaining} bytes remaining)")]
    MalformedFrame {
        reason: &'static str,
        remaining: usize,
    },

    #[error("registry hash mismatch: ours {ours:#018x}, theirs {theirs:#018x}")]
    HashMismatch { ours: u64, theirs: u64 },

    #[error("connection is not in the connected state")]
    NotConnected,

    #[error("unknown peer id {0}")]
    UnknownPeer(u64),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
