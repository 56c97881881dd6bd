//! # Server Role
//!
//! Accepts connections, gates them on the registry compatibility hash, and
//! pumps transport events into the per-peer connections.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::value::Value;
use crate::error::{ProtocolError, Result};
use crate::protocol::connection::{Connection, PeerId};
use crate::protocol::handler::Handler;
use crate::protocol::registry::MessageRegistry;
use crate::session::event::{EventSink, NullEventSink};
use crate::session::PeerTable;
use crate::transport::{Delivery, PeerHandle, Transport, TransportEvent};

/// Factory producing one handler instance per accepted connection.
type HandlerFactory = Box<dyn Fn() -> Box<dyn Handler>>;

/// Accepting side of the protocol. Owns every accepted [`Connection`];
/// constructing a server freezes the registry.
pub struct Server<T: Transport> {
    transport: T,
    registry: Arc<MessageRegistry>,
    peers: PeerTable,
    default_handler: Option<HandlerFactory>,
    sink: Box<dyn EventSink>,
    connection_limit: Option<usize>,
}

impl<T: Transport> Server<T> {
    /// Create a server over `transport`. The registry is frozen here: no
    /// schema may be registered once a server exists for it.
    pub fn new(transport: T, registry: Arc<MessageRegistry>) -> Self {
        Self::with_sink(transport, registry, Box::new(NullEventSink))
    }

    /// Create a server with an event sink bridging into the host.
    pub fn with_sink(
        transport: T,
        registry: Arc<MessageRegistry>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        registry.freeze();
        info!(
            hash = format_args!("{:#018x}", registry.hash()),
            schemas = registry.len(),
            "server created"
        );
        Self {
            transport,
            registry,
            peers: PeerTable::new(),
            default_handler: None,
            sink,
            connection_limit: None,
        }
    }

    /// Cap concurrent connections; peers beyond the cap are refused at
    /// admission.
    pub fn set_connection_limit(&mut self, limit: usize) {
        self.connection_limit = Some(limit);
    }

    /// Attach a fresh handler from `factory` to every connection this
    /// server admits from now on.
    pub fn set_default_handler(&mut self, factory: impl Fn() -> Box<dyn Handler> + 'static) {
        self.default_handler = Some(Box::new(factory));
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    /// The transport adapter, for host-level operations the core does not
    /// wrap.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Number of admitted, not yet disconnected peers.
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    pub fn connection(&self, peer_id: PeerId) -> Option<&Connection> {
        self.peers.get(peer_id)
    }

    pub fn connection_mut(&mut self, peer_id: PeerId) -> Option<&mut Connection> {
        self.peers.get_mut(peer_id)
    }

    /// Lazy traversal of connections, skipping those in `exclude`. Useful
    /// for "everyone but the sender" patterns.
    pub fn connections<'a>(
        &'a self,
        exclude: &'a HashSet<PeerId>,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.peers
            .values()
            .filter(move |c| !exclude.contains(&c.peer_id()))
    }

    /// Lazy traversal of each non-excluded connection's first handler.
    pub fn handlers<'a>(
        &'a self,
        exclude: &'a HashSet<PeerId>,
    ) -> impl Iterator<Item = &'a dyn Handler> + 'a {
        self.connections(exclude)
            .filter_map(|c| c.handlers().first())
    }

    /// Service entry point. Drains every pending transport event and
    /// performs the resulting state transitions synchronously. `timeout`
    /// bounds only the transport poll and is owned by the host loop.
    pub fn step(&mut self, timeout: Duration) -> Result<()> {
        let events = self.transport.poll(timeout)?;
        for event in events {
            match event {
                TransportEvent::Connect { peer, hash } => self.admit(peer, hash),
                TransportEvent::Disconnect { peer } => self.drop_peer(peer),
                TransportEvent::Receive {
                    peer,
                    channel,
                    data,
                } => self.deliver(peer, channel, &data),
            }
        }
        Ok(())
    }

    /// Send one message to a peer on channel 0, reliable.
    pub fn send(&mut self, peer_id: PeerId, name: &str, args: Vec<Value>) -> Result<u64> {
        let conn = self
            .peers
            .get_mut(peer_id)
            .ok_or(ProtocolError::UnknownPeer(peer_id.0))?;
        conn.send(&mut self.transport, name, args)
    }

    /// Send one message to a peer with explicit channel and delivery.
    pub fn send_on(
        &mut self,
        peer_id: PeerId,
        name: &str,
        args: Vec<Value>,
        channel: u8,
        delivery: Delivery,
    ) -> Result<u64> {
        let conn = self
            .peers
            .get_mut(peer_id)
            .ok_or(ProtocolError::UnknownPeer(peer_id.0))?;
        conn.send_on(&mut self.transport, name, args, channel, delivery)
    }

    /// Send one message to every connected peer not in `exclude`. The
    /// frame is packed once. Returns the number of peers it went to.
    pub fn broadcast(
        &mut self,
        name: &str,
        args: Vec<Value>,
        channel: u8,
        delivery: Delivery,
        exclude: &HashSet<PeerId>,
    ) -> Result<usize> {
        let message = self.registry.construct(name, args)?;
        let frame = self.registry.pack(&message)?;
        let mut sent = 0;
        for conn in self.peers.values_mut() {
            if exclude.contains(&conn.peer_id()) || !conn.is_connected() {
                continue;
            }
            conn.send_frame(&mut self.transport, &frame, channel, delivery)?;
            sent += 1;
        }
        debug!(name, peers = sent, "broadcast");
        Ok(sent)
    }

    /// Request a graceful disconnect of one peer. The connection drops out
    /// of the map when the transport confirms.
    pub fn disconnect(&mut self, peer_id: PeerId) -> Result<()> {
        let conn = self
            .peers
            .get_mut(peer_id)
            .ok_or(ProtocolError::UnknownPeer(peer_id.0))?;
        conn.request_disconnect(&mut self.transport);
        Ok(())
    }

    /// Hash admission (the negotiation gate): equal hashes admit the peer,
    /// anything else refuses it before a single payload is exchanged.
    fn admit(&mut self, peer: PeerHandle, theirs: u64) {
        if let Some(limit) = self.connection_limit {
            if self.peers.len() >= limit {
                warn!(%peer, limit, "connection refused: limit reached");
                self.transport.disconnect_now(peer);
                return;
            }
        }
        let ours = self.registry.hash();
        if theirs != ours {
            let err = ProtocolError::HashMismatch { ours, theirs };
            warn!(%peer, error = %err, "connection refused");
            self.transport.disconnect_now(peer);
            return;
        }
        let peer_id = self.peers.next_id();
        let mut conn = Connection::new(peer_id, peer, Arc::clone(&self.registry));
        if let Some(factory) = &self.default_handler {
            conn.add_handler(factory());
        }
        info!(%peer_id, %peer, "connection accepted");
        conn.mark_connected(&mut self.transport, &mut *self.sink);
        self.peers.insert(conn);
    }

    fn drop_peer(&mut self, peer: PeerHandle) {
        match self.peers.remove_by_handle(peer) {
            Some(mut conn) => conn.mark_disconnected(&mut self.transport, &mut *self.sink),
            None => debug!(%peer, "disconnect for unknown peer"),
        }
    }

    fn deliver(&mut self, peer: PeerHandle, channel: u8, data: &[u8]) {
        let Some(conn) = self.peers.get_by_handle_mut(peer) else {
            debug!(%peer, "receive for unknown peer");
            return;
        };
        if let Err(e) = conn.receive(&mut self.transport, &mut *self.sink, data, channel) {
            warn!(peer_id = %conn.peer_id(), error = %e, "protocol violation, forcing disconnect");
            self.transport.disconnect_now(peer);
            self.drop_peer(peer);
        }
    }
}
