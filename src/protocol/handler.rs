//! # Handlers and the Dispatch Chain
//!
//! Application code reacts to a connection through [`Handler`] objects
//! attached to it. Dispatch is a broadcast: every handler in the chain sees
//! every inbound message, in attachment order — multiple independent
//! subsystems (logging, game-state update, UI bridge) may all need the same
//! message, so consuming a message in one handler never hides it from the
//! next.
//!
//! Per-handler resolution for one message:
//! 1. [`Handler::on_named`] — the handler's dedicated per-schema routes,
//!    usually a `match` on [`Message::name`]. Returning `true` means a
//!    dedicated route handled the message.
//! 2. otherwise [`Handler::on_receive`], the generic route.
//!
//! A handler that implements neither simply skips the message.

use tracing::trace;

use crate::protocol::connection::Endpoint;
use crate::protocol::schema::Message;

/// Reactions to connection lifecycle and inbound messages. Every method
/// has a no-op default; implement only the capabilities you need.
///
/// Handlers never hold a reference to their connection. Each callback
/// receives a borrowed [`Endpoint`] instead, which exposes the connection
/// and can send replies.
///
/// ```
/// use message_protocol::protocol::{Endpoint, Handler, Message};
///
/// struct Echo;
///
/// impl Handler for Echo {
///     fn on_named(&mut self, ep: &mut Endpoint<'_>, msg: &Message, channel: u8) -> bool {
///         match msg.name() {
///             "echo" => {
///                 let _ = ep.send("echo", msg.values().to_vec());
///                 let _ = channel;
///                 true
///             }
///             _ => false,
///         }
///     }
/// }
/// ```
#[allow(unused_variables)]
pub trait Handler {
    /// The connection entered `Connected`.
    fn on_connect(&mut self, ep: &mut Endpoint<'_>) {}

    /// The connection entered `Disconnected`.
    fn on_disconnect(&mut self, ep: &mut Endpoint<'_>) {}

    /// Generic route for messages without a dedicated one.
    fn on_receive(&mut self, ep: &mut Endpoint<'_>, message: &Message, channel: u8) {}

    /// Dedicated per-schema routes. Return `false` when the message name
    /// has no dedicated route, so dispatch falls back to
    /// [`Handler::on_receive`].
    fn on_named(&mut self, ep: &mut Endpoint<'_>, message: &Message, channel: u8) -> bool {
        false
    }
}

/// Ordered list of handlers attached to one connection. Attachment order
/// defines dispatch order and is permanent for the connection's lifetime.
#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Box<dyn Handler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the end of the chain.
    pub fn attach(&mut self, handler: Box<dyn Handler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Borrow the first attached handler, if any.
    pub fn first(&self) -> Option<&dyn Handler> {
        self.handlers.first().map(Box::as_ref)
    }

    /// Move every handler of `other` onto the end of this chain.
    pub(crate) fn merge(&mut self, mut other: HandlerChain) {
        self.handlers.append(&mut other.handlers);
    }

    /// Broadcast one message to every handler, in attachment order.
    pub(crate) fn dispatch(&mut self, ep: &mut Endpoint<'_>, message: &Message, channel: u8) {
        for handler in &mut self.handlers {
            if !handler.on_named(ep, message, channel) {
                trace!(name = message.name(), "no dedicated route, generic on_receive");
                handler.on_receive(ep, message, channel);
            }
        }
    }

    pub(crate) fn connected(&mut self, ep: &mut Endpoint<'_>) {
        for handler in &mut self.handlers {
            handler.on_connect(ep);
        }
    }

    pub(crate) fn disconnected(&mut self, ep: &mut Endpoint<'_>) {
        for handler in &mut self.handlers {
            handler.on_disconnect(ep);
        }
    }
}
