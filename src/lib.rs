//! # Message Protocol
//!
//! Typed, schema-negotiated messaging between two endpoints over an
//! arbitrary reliable transport. The transport and the wire codec are both
//! pluggable and swap independently.
//!
//! The layer is a runtime type registry plus the machinery around it:
//! schemas get stable sequential ids, peers negotiate compatibility with a
//! content hash before any payload is exchanged, messages are packed and
//! unpacked through the configured codec, and decoded messages are
//! broadcast to an ordered chain of handlers.
//!
//! ## Architecture
//! - [`core`](crate::core): field values, codecs, the wire frame layout
//! - [`protocol`]: the registry, connections, handler dispatch
//! - [`session`]: server/client roles driven by transport events
//! - [`transport`]: the adapter contract plus bundled memory and TCP
//!   adapters
//! - [`config`] / [`utils::logging`]: host-facing configuration
//!
//! Everything is single-threaded and reactive: state changes happen
//! synchronously inside `step`, which the host loop calls with a poll
//! timeout it owns. Nothing here blocks or locks.
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use message_protocol::protocol::{Endpoint, Handler, Message, MessageRegistry};
//! use message_protocol::session::{Client, Server};
//! use message_protocol::transport::memory::MemoryNetwork;
//! use message_protocol::Value;
//!
//! struct EchoBack;
//!
//! impl Handler for EchoBack {
//!     fn on_named(&mut self, ep: &mut Endpoint<'_>, msg: &Message, _channel: u8) -> bool {
//!         match msg.name() {
//!             "echo" => {
//!                 ep.send("echo", msg.values().to_vec()).ok();
//!                 true
//!             }
//!             _ => false,
//!         }
//!     }
//! }
//!
//! # fn main() -> message_protocol::Result<()> {
//! let mut registry = MessageRegistry::new();
//! registry.register("echo", &["msg"])?;
//! let registry = Arc::new(registry);
//!
//! let net = MemoryNetwork::new();
//! let mut server = Server::new(net.listen(25500), Arc::clone(&registry));
//! server.set_default_handler(|| Box::new(EchoBack));
//!
//! let mut client = Client::new(net.client(), registry);
//! let peer = client.connect("localhost", 25500)?;
//!
//! let no_wait = Duration::from_millis(0);
//! server.step(no_wait)?; // admit
//! client.step(no_wait)?; // confirm
//! client.send(peer, "echo", vec![Value::from("hello")])?;
//! server.step(no_wait)?; // dispatch to EchoBack, which echoes
//! client.step(no_wait)?; // client receives the echo
//!
//! let stats = client.connection(peer).expect("connection").stats();
//! assert_eq!(stats.messages_received, 1);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod utils;

pub use crate::core::codec::CodecKind;
pub use crate::core::value::Value;
pub use config::ProtocolConfig;
pub use error::{ProtocolError, Result};
pub use protocol::{
    Connection, ConnectionState, Handler, Message, MessageRegistry, MessageSchema, PeerId,
};
pub use session::{Client, EventSink, NullEventSink, Server};
pub use transport::{Delivery, PeerHandle, Transport, TransportEvent};
