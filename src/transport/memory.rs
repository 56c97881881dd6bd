//! In-process loopback transport.
//!
//! A [`MemoryNetwork`] is a hub joining any number of endpoints through
//! in-process event queues: servers `listen` on a port, clients `connect`
//! to it, and every delivery is a queue push. Event semantics mirror a
//! real host-based adapter so session code cannot tell the difference:
//! transport-level connects complete immediately on both sides, a graceful
//! disconnect surfaces on both sides, `disconnect_now` only on the remote.
//!
//! Single-threaded by construction (`Rc<RefCell<_>>`), matching the
//! cooperative model of the whole layer. Used by the tests and demos.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::error::{ProtocolError, Result};
use crate::transport::{Delivery, PeerHandle, Transport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EndpointId(u64);

struct Link {
    owner: EndpointId,
    remote: PeerHandle,
    open: bool,
}

#[derive(Default)]
struct Net {
    queues: HashMap<EndpointId, VecDeque<TransportEvent>>,
    listeners: HashMap<u16, EndpointId>,
    links: HashMap<PeerHandle, Link>,
    next_endpoint: u64,
    next_handle: u64,
}

impl Net {
    fn new_endpoint(&mut self) -> EndpointId {
        self.next_endpoint += 1;
        let id = EndpointId(self.next_endpoint);
        self.queues.insert(id, VecDeque::new());
        id
    }

    fn new_handle(&mut self) -> PeerHandle {
        self.next_handle += 1;
        PeerHandle(self.next_handle)
    }

    fn push(&mut self, endpoint: EndpointId, event: TransportEvent) {
        if let Some(queue) = self.queues.get_mut(&endpoint) {
            queue.push_back(event);
        }
    }
}

/// Hub creating in-process transport endpoints.
#[derive(Default)]
pub struct MemoryNetwork {
    inner: Rc<RefCell<Net>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a listening endpoint bound to `port`.
    pub fn listen(&self, port: u16) -> MemoryTransport {
        let mut net = self.inner.borrow_mut();
        let id = net.new_endpoint();
        net.listeners.insert(port, id);
        MemoryTransport {
            net: Rc::clone(&self.inner),
            id,
        }
    }

    /// Create a connecting endpoint.
    pub fn client(&self) -> MemoryTransport {
        let id = self.inner.borrow_mut().new_endpoint();
        MemoryTransport {
            net: Rc::clone(&self.inner),
            id,
        }
    }
}

/// One endpoint of a [`MemoryNetwork`].
pub struct MemoryTransport {
    net: Rc<RefCell<Net>>,
    id: EndpointId,
}

impl Transport for MemoryTransport {
    fn connect(
        &mut self,
        _address: &str,
        port: u16,
        hash: u64,
        _channels: u8,
    ) -> Result<PeerHandle> {
        let mut net = self.net.borrow_mut();
        let listener = *net
            .listeners
            .get(&port)
            .ok_or_else(|| ProtocolError::Transport(format!("no listener on port {port}")))?;
        let local = net.new_handle();
        let remote = net.new_handle();
        net.links.insert(
            local,
            Link {
                owner: self.id,
                remote,
                open: true,
            },
        );
        net.links.insert(
            remote,
            Link {
                owner: listener,
                remote: local,
                open: true,
            },
        );
        // Transport-level handshake completes immediately in-process; the
        // hash still only travels to the accepting side.
        net.push(listener, TransportEvent::Connect { peer: remote, hash });
        net.push(self.id, TransportEvent::Connect { peer: local, hash: 0 });
        Ok(local)
    }

    fn poll(&mut self, _timeout: Duration) -> Result<Vec<TransportEvent>> {
        // Nothing can arrive while this thread waits, so the timeout is
        // moot: drain whatever is queued and return.
        let mut net = self.net.borrow_mut();
        Ok(net
            .queues
            .get_mut(&self.id)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default())
    }

    fn send(
        &mut self,
        peer: PeerHandle,
        data: &[u8],
        channel: u8,
        _delivery: Delivery,
    ) -> Result<()> {
        let mut net = self.net.borrow_mut();
        let (remote_owner, remote) = match net.links.get(&peer) {
            Some(link) if link.open => match net.links.get(&link.remote) {
                Some(remote_link) => (remote_link.owner, link.remote),
                None => return Err(ProtocolError::Transport(format!("{peer} has no remote"))),
            },
            _ => return Err(ProtocolError::Transport(format!("{peer} is not connected"))),
        };
        net.push(
            remote_owner,
            TransportEvent::Receive {
                peer: remote,
                channel,
                data: data.to_vec(),
            },
        );
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerHandle) {
        let mut net = self.net.borrow_mut();
        let Some(link) = net.links.get_mut(&peer) else {
            return;
        };
        if !link.open {
            return;
        }
        link.open = false;
        let remote = link.remote;
        let local_owner = link.owner;
        if let Some(remote_link) = net.links.get_mut(&remote) {
            remote_link.open = false;
            let remote_owner = remote_link.owner;
            net.push(remote_owner, TransportEvent::Disconnect { peer: remote });
        }
        net.push(local_owner, TransportEvent::Disconnect { peer });
    }

    fn disconnect_now(&mut self, peer: PeerHandle) {
        let mut net = self.net.borrow_mut();
        let Some(link) = net.links.remove(&peer) else {
            return;
        };
        if let Some(remote_link) = net.links.get_mut(&link.remote) {
            remote_link.open = false;
            let remote_owner = remote_link.owner;
            let remote = link.remote;
            net.push(remote_owner, TransportEvent::Disconnect { peer: remote });
        }
    }
}
