//! # Connection
//!
//! Per-peer session state: lifecycle, traffic counters, the handler chain,
//! and the send/receive entry points.
//!
//! A connection is created when the transport reports a connect/accept
//! event and torn down when it reports the matching disconnect. The owning
//! session (server or client role) holds connections exclusively; a
//! connection itself stores only its peer identity and transport handle,
//! never a pointer back to its owner.

use std::fmt;
use std::mem;
use std::sync::Arc;

use tracing::{debug, info};

use crate::core::value::Value;
use crate::error::{ProtocolError, Result};
use crate::protocol::handler::{Handler, HandlerChain};
use crate::protocol::registry::MessageRegistry;
use crate::protocol::schema::Message;
use crate::session::event::EventSink;
use crate::transport::{Delivery, PeerHandle, Transport};

/// Application-assigned peer identity; the session map key. Assigned
/// sequentially and never reused within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created; transport connect not yet confirmed. No traffic allowed.
    Pending,
    /// Transport confirmed; message traffic allowed.
    Connected,
    /// Terminal. The object is only retained to drain in-flight callbacks.
    Disconnected,
}

/// Monotonically increasing traffic counters for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

/// Per-peer session state. See the module docs.
pub struct Connection {
    peer_id: PeerId,
    peer: PeerHandle,
    registry: Arc<MessageRegistry>,
    state: ConnectionState,
    chain: HandlerChain,
    stats: LinkStats,
    disconnect_requested: bool,
}

impl Connection {
    pub(crate) fn new(peer_id: PeerId, peer: PeerHandle, registry: Arc<MessageRegistry>) -> Self {
        Self {
            peer_id,
            peer,
            registry,
            state: ConnectionState::Pending,
            chain: HandlerChain::new(),
            stats: LinkStats::default(),
            disconnect_requested: false,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Transport handle of the remote peer.
    pub fn peer(&self) -> PeerHandle {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Registry this connection encodes and decodes against.
    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    /// Handlers attached to this connection.
    pub fn handlers(&self) -> &HandlerChain {
        &self.chain
    }

    /// Whether a graceful disconnect has been requested but not yet
    /// confirmed by the transport.
    pub fn disconnect_requested(&self) -> bool {
        self.disconnect_requested
    }

    /// Append a handler to the end of the chain and hand it this
    /// connection's lifecycle from now on. Attachment order defines
    /// dispatch order.
    pub fn add_handler(&mut self, handler: Box<dyn Handler>) {
        self.chain.attach(handler);
    }

    /// Send a message on channel 0 with reliable delivery.
    pub fn send(
        &mut self,
        transport: &mut dyn Transport,
        name: &str,
        args: Vec<Value>,
    ) -> Result<u64> {
        self.send_on(transport, name, args, 0, Delivery::Reliable)
    }

    /// Construct, pack and hand one message to the transport. Returns the
    /// message id usable for later correlation.
    ///
    /// # Errors
    /// `NotConnected` unless the state is `Connected`; `ArgumentCount` /
    /// `UnknownMessage` from construction; transport errors from the send.
    pub fn send_on(
        &mut self,
        transport: &mut dyn Transport,
        name: &str,
        args: Vec<Value>,
        channel: u8,
        delivery: Delivery,
    ) -> Result<u64> {
        if self.state != ConnectionState::Connected {
            return Err(ProtocolError::NotConnected);
        }
        let message = self.registry.construct(name, args)?;
        let frame = self.registry.pack(&message)?;
        transport.send(self.peer, &frame, channel, delivery)?;
        self.stats.messages_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        debug!(
            peer = %self.peer_id,
            name,
            channel,
            bytes = frame.len(),
            "message sent"
        );
        Ok(self.stats.messages_sent)
    }

    /// Send an already-packed frame, bumping the counters. Lets a session
    /// broadcast one packed frame to many peers without re-encoding it.
    pub(crate) fn send_frame(
        &mut self,
        transport: &mut dyn Transport,
        frame: &[u8],
        channel: u8,
        delivery: Delivery,
    ) -> Result<u64> {
        if self.state != ConnectionState::Connected {
            return Err(ProtocolError::NotConnected);
        }
        transport.send(self.peer, frame, channel, delivery)?;
        self.stats.messages_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        Ok(self.stats.messages_sent)
    }

    /// Record a graceful disconnect intent and ask the transport to wind
    /// the link down. The state only becomes `Disconnected` when the
    /// transport surfaces the event on a later poll.
    pub fn request_disconnect(&mut self, transport: &mut dyn Transport) {
        if self.state == ConnectionState::Disconnected || self.disconnect_requested {
            return;
        }
        self.disconnect_requested = true;
        transport.disconnect(self.peer);
        debug!(peer = %self.peer_id, "disconnect requested");
    }

    /// Decode and dispatch every frame in one received transport packet.
    ///
    /// Each decoded message bumps the counters, notifies the event sink,
    /// then runs the handler chain. A decode failure aborts the loop and
    /// propagates: a framing desync is unrecoverable without
    /// transport-level resynchronization, so the owning session force-
    /// disconnects this connection instead of dropping bytes silently.
    pub(crate) fn receive(
        &mut self,
        transport: &mut dyn Transport,
        sink: &mut dyn EventSink,
        data: &[u8],
        channel: u8,
    ) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let mut frames = registry.unpack_all(data);
        let mut remaining = data.len();
        while let Some(item) = frames.next() {
            let message = item?;
            let consumed = remaining - frames.remaining();
            remaining = frames.remaining();
            self.stats.messages_received += 1;
            self.stats.bytes_received += consumed as u64;
            debug!(
                peer = %self.peer_id,
                name = message.name(),
                channel,
                bytes = consumed,
                "message received"
            );
            sink.on_message_received(&*self, channel, &message, self.stats.messages_received);
            self.with_chain(transport, |chain, ep| chain.dispatch(ep, &message, channel));
        }
        Ok(())
    }

    /// Transport confirmed the connect. Runs the sink and every handler's
    /// `on_connect`.
    pub(crate) fn mark_connected(&mut self, transport: &mut dyn Transport, sink: &mut dyn EventSink) {
        if self.state != ConnectionState::Pending {
            return;
        }
        self.state = ConnectionState::Connected;
        info!(peer = %self.peer_id, "connection established");
        sink.on_connected(&*self);
        self.with_chain(transport, |chain, ep| chain.connected(ep));
    }

    /// Transport reported the disconnect. Runs the sink and every
    /// handler's `on_disconnect`; the owner removes the map entry next.
    pub(crate) fn mark_disconnected(
        &mut self,
        transport: &mut dyn Transport,
        sink: &mut dyn EventSink,
    ) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnected;
        info!(peer = %self.peer_id, "connection closed");
        sink.on_disconnected(&*self);
        self.with_chain(transport, |chain, ep| chain.disconnected(ep));
    }

    /// Run `f` against the handler chain with an [`Endpoint`] view of this
    /// connection. The chain is moved out for the duration so handlers may
    /// call back into the connection (send, attach another handler);
    /// handlers attached while running are appended after the existing
    /// ones.
    fn with_chain(
        &mut self,
        transport: &mut dyn Transport,
        f: impl FnOnce(&mut HandlerChain, &mut Endpoint<'_>),
    ) {
        let mut chain = mem::take(&mut self.chain);
        let mut ep = Endpoint {
            conn: self,
            transport,
        };
        f(&mut chain, &mut ep);
        let added = mem::replace(&mut self.chain, chain);
        self.chain.merge(added);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer_id", &self.peer_id)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("handlers", &self.chain.len())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Borrowed view of a connection plus its transport, handed to handler and
/// sink callbacks. This is what replaces a stored back-reference: handlers
/// can act on their connection only while the core is calling them.
pub struct Endpoint<'a> {
    conn: &'a mut Connection,
    transport: &'a mut dyn Transport,
}

impl Endpoint<'_> {
    /// Send a message on channel 0 with reliable delivery.
    pub fn send(&mut self, name: &str, args: Vec<Value>) -> Result<u64> {
        self.conn.send(self.transport, name, args)
    }

    /// Send with explicit channel and delivery flags.
    pub fn send_on(
        &mut self,
        name: &str,
        args: Vec<Value>,
        channel: u8,
        delivery: Delivery,
    ) -> Result<u64> {
        self.conn.send_on(self.transport, name, args, channel, delivery)
    }

    /// Request a graceful disconnect of this connection.
    pub fn request_disconnect(&mut self) {
        self.conn.request_disconnect(self.transport);
    }

    /// Attach another handler to this connection. It joins the chain after
    /// the current dispatch pass finishes.
    pub fn add_handler(&mut self, handler: Box<dyn Handler>) {
        self.conn.add_handler(handler);
    }

    /// The connection under this endpoint.
    pub fn connection(&self) -> &Connection {
        self.conn
    }
}
