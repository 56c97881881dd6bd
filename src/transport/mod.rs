//! # Transport Adapters
//!
//! The protocol core delegates connection establishment, packet delivery
//! and channel multiplexing to a transport adapter behind the [`Transport`]
//! trait. Adapters are chosen by the host application at initialization and
//! passed in as a concrete value; the core never probes for one.
//!
//! Two adapters are bundled:
//! - **memory**: in-process loopback hub, used by the tests and demos
//! - **tcp**: non-blocking TCP over `std::net`
//!
//! The contract is synchronous and poll-driven. `poll` drains every pending
//! event and is the only call that may block, bounded by the timeout the
//! host loop supplies.

pub mod memory;
pub mod tcp;

use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Opaque handle to a remote peer, assigned by the transport. The session
/// layer maps handles to its own peer identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerHandle(pub u64);

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Delivery flags for an outgoing packet. Transports that are already
/// reliable and ordered (e.g. TCP) may ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Reliable, ordered delivery on the packet's channel.
    #[default]
    Reliable,
    /// Fire-and-forget; the transport may drop the packet.
    Unreliable,
}

/// Event surfaced by [`Transport::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A transport-level connection completed. On the accepting side,
    /// `hash` is the compatibility hash the initiator supplied to
    /// [`Transport::connect`]; on the initiating side it is zero.
    Connect { peer: PeerHandle, hash: u64 },
    /// The peer is gone: remote close, local request, or rejection.
    Disconnect { peer: PeerHandle },
    /// One transport packet arrived. Packets carry whole frames; splitting
    /// and reassembly are the adapter's responsibility.
    Receive {
        peer: PeerHandle,
        channel: u8,
        data: Vec<u8>,
    },
}

/// Reliable, ordered (per channel) packet delivery between peers.
pub trait Transport {
    /// Open an outgoing connection, carrying the compatibility hash in the
    /// transport-level handshake. Completion is signalled later by a
    /// [`TransportEvent::Connect`] for the returned handle.
    fn connect(&mut self, address: &str, port: u16, hash: u64, channels: u8)
        -> Result<PeerHandle>;

    /// Drain all pending events. May wait up to `timeout` for the first
    /// event; never blocks beyond it.
    fn poll(&mut self, timeout: Duration) -> Result<Vec<TransportEvent>>;

    /// Queue one packet to a peer on the given channel.
    fn send(&mut self, peer: PeerHandle, data: &[u8], channel: u8, delivery: Delivery)
        -> Result<()>;

    /// Request a graceful disconnect. The link stays usable until the
    /// adapter surfaces the matching [`TransportEvent::Disconnect`].
    fn disconnect(&mut self, peer: PeerHandle);

    /// Drop the peer immediately, without notifying it beyond the closed
    /// link. Used when a connection is refused or force-closed.
    fn disconnect_now(&mut self, peer: PeerHandle);
}
