//! # Client Role
//!
//! Initiates connections, sending the registry compatibility hash with the
//! transport-level handshake, and pumps transport events into its
//! connections. The accepting side performs the hash comparison; a refusal
//! comes back as an ordinary disconnect before any message traffic.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::core::value::Value;
use crate::error::{ProtocolError, Result};
use crate::protocol::connection::{Connection, PeerId};
use crate::protocol::handler::Handler;
use crate::protocol::registry::MessageRegistry;
use crate::session::event::{EventSink, NullEventSink};
use crate::session::PeerTable;
use crate::transport::{Delivery, PeerHandle, Transport, TransportEvent};

/// Default channel count requested on connect.
pub const DEFAULT_CHANNELS: u8 = 2;

/// Initiating side of the protocol. Owns every outgoing [`Connection`].
pub struct Client<T: Transport> {
    transport: T,
    registry: Arc<MessageRegistry>,
    peers: PeerTable,
    sink: Box<dyn EventSink>,
    channels: u8,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, registry: Arc<MessageRegistry>) -> Self {
        Self::with_sink(transport, registry, Box::new(NullEventSink))
    }

    /// Create a client with an event sink bridging into the host.
    pub fn with_sink(
        transport: T,
        registry: Arc<MessageRegistry>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            transport,
            registry,
            peers: PeerTable::new(),
            sink,
            channels: DEFAULT_CHANNELS,
        }
    }

    /// Channels requested on subsequent connects.
    pub fn set_channel_count(&mut self, channels: u8) {
        self.channels = channels;
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Open a connection to a listening peer. Freezes the registry — no
    /// schema may be registered after the first connect attempt — and
    /// carries its hash in the transport handshake. The returned
    /// connection starts `Pending`; traffic is allowed once a later
    /// [`step`](Self::step) surfaces the transport's connect confirmation.
    pub fn connect(&mut self, address: &str, port: u16) -> Result<PeerId> {
        self.registry.freeze();
        let hash = self.registry.hash();
        info!(
            address,
            port,
            hash = format_args!("{hash:#018x}"),
            "connecting"
        );
        let peer = self
            .transport
            .connect(address, port, hash, self.channels)?;
        let peer_id = self.peers.next_id();
        self.peers
            .insert(Connection::new(peer_id, peer, Arc::clone(&self.registry)));
        Ok(peer_id)
    }

    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    pub fn connection(&self, peer_id: PeerId) -> Option<&Connection> {
        self.peers.get(peer_id)
    }

    pub fn connection_mut(&mut self, peer_id: PeerId) -> Option<&mut Connection> {
        self.peers.get_mut(peer_id)
    }

    /// Lazy traversal of connections, skipping those in `exclude`.
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

    /// Service entry point; see [`Server::step`](crate::session::Server::step).
    pub fn step(&mut self, timeout: Duration) -> Result<()> {
        let events = self.transport.poll(timeout)?;
        for event in events {
            match event {
                TransportEvent::Connect { peer, .. } => {
                    match self.peers.get_by_handle_mut(peer) {
                        Some(conn) => conn.mark_connected(&mut self.transport, &mut *self.sink),
                        None => debug!(%peer, "connect for unknown peer"),
                    }
                }
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

    /// Send one message on channel 0, reliable.
    pub fn send(&mut self, peer_id: PeerId, name: &str, args: Vec<Value>) -> Result<u64> {
        let conn = self
            .peers
            .get_mut(peer_id)
            .ok_or(ProtocolError::UnknownPeer(peer_id.0))?;
        conn.send(&mut self.transport, name, args)
    }

    /// Send one message with explicit channel and delivery.
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

    /// Request a graceful disconnect of one connection.
    pub fn disconnect(&mut self, peer_id: PeerId) -> Result<()> {
        let conn = self
            .peers
            .get_mut(peer_id)
            .ok_or(ProtocolError::UnknownPeer(peer_id.0))?;
        conn.request_disconnect(&mut self.transport);
        Ok(())
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
            tracing::warn!(peer_id = %conn.peer_id(), error = %e, "protocol violation, forcing disconnect");
            self.transport.disconnect_now(peer);
            self.drop_peer(peer);
        }
    }
}
