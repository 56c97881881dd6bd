//! Event-sink seam for host applications.
//!
//! The original audience for these notifications is a host UI/event queue,
//! but the core assumes nothing about the delivery mechanism — a sink may
//! post to an event loop, feed metrics, or do nothing. Notifications are
//! invoked synchronously: `on_connected`/`on_disconnected` right after the
//! state transition and before the handler chain runs, and
//! `on_message_received` per decoded message, before that message is
//! dispatched.

use crate::protocol::connection::Connection;
use crate::protocol::schema::Message;

/// Host-side observer of connection lifecycle and inbound messages.
#[allow(unused_variables)]
pub trait EventSink {
    /// A connection entered `Connected`.
    fn on_connected(&mut self, conn: &Connection) {}

    /// A connection entered `Disconnected`.
    fn on_disconnected(&mut self, conn: &Connection) {}

    /// One message was decoded on `conn`. `message_id` is the connection's
    /// received-message counter after this message.
    fn on_message_received(
        &mut self,
        conn: &Connection,
        channel: u8,
        message: &Message,
        message_id: u64,
    ) {
    }
}

/// Sink that ignores every notification. The default when the host has no
/// event queue to bridge into.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {}
