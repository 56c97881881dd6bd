//! # Session Management
//!
//! The server and client roles. Each owns the map from peer identity to
//! [`Connection`] and is driven exclusively by transport-adapter events
//! surfaced from its `step` call: connects pass hash admission, receives
//! are forwarded to the matching connection, disconnects tear the
//! connection down and drop the map entry.
//!
//! Everything runs on the caller's thread; `step` is the single service
//! entry point the host loop invokes, and the transport poll inside it is
//! the only operation that may wait.

pub mod client;
pub mod event;
pub mod server;

pub use client::Client;
pub use event::{EventSink, NullEventSink};
pub use server::Server;

use std::collections::HashMap;

use crate::protocol::connection::{Connection, PeerId};
use crate::transport::PeerHandle;

/// Peer bookkeeping shared by both session roles: the id-keyed connection
/// map plus the transport-handle index into it. Peer ids are sequential
/// and never reused within a process lifetime.
#[derive(Default)]
pub(crate) struct PeerTable {
    conns: HashMap<PeerId, Connection>,
    by_handle: HashMap<PeerHandle, PeerId>,
    next_peer_id: u64,
}

impl PeerTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocate the next peer id.
    pub(crate) fn next_id(&mut self) -> PeerId {
        self.next_peer_id += 1;
        PeerId(self.next_peer_id)
    }

    pub(crate) fn insert(&mut self, conn: Connection) {
        self.by_handle.insert(conn.peer(), conn.peer_id());
        self.conns.insert(conn.peer_id(), conn);
    }

    /// Drop a peer by transport handle, returning the connection for its
    /// final callbacks.
    pub(crate) fn remove_by_handle(&mut self, peer: PeerHandle) -> Option<Connection> {
        let peer_id = self.by_handle.remove(&peer)?;
        self.conns.remove(&peer_id)
    }

    pub(crate) fn get(&self, peer_id: PeerId) -> Option<&Connection> {
        self.conns.get(&peer_id)
    }

    pub(crate) fn get_mut(&mut self, peer_id: PeerId) -> Option<&mut Connection> {
        self.conns.get_mut(&peer_id)
    }

    pub(crate) fn get_by_handle_mut(&mut self, peer: PeerHandle) -> Option<&mut Connection> {
        let peer_id = *self.by_handle.get(&peer)?;
        self.conns.get_mut(&peer_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.conns.len()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Connection> {
        self.conns.values()
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.conns.values_mut()
    }
}
