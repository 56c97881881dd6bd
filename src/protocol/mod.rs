//! # Protocol Layer
//!
//! The message protocol proper: the schema registry with its compatibility
//! hash, decoded message instances, per-peer connections, and the handler
//! dispatch chain.
//!
//! ## Components
//! - **Registry**: names → schemas, sequential ids, freeze semantics, the
//!   negotiation hash, and frame pack/unpack
//! - **Connection**: per-peer state machine and traffic counters
//! - **Handler**: application callbacks with broadcast dispatch

pub mod connection;
pub mod handler;
pub mod registry;
pub mod schema;

pub use connection::{Connection, ConnectionState, Endpoint, LinkStats, PeerId};
pub use handler::{Handler, HandlerChain};
pub use registry::{Frames, MessageRegistry};
pub use schema::{Message, MessageSchema};
