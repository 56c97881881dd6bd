//! Non-blocking TCP transport adapter over `std::net`.
//!
//! Wire layout, all integers big-endian:
//! - connect preamble (initiator → acceptor):
//!   `[magic "MPRO"][version u8][hash u64][channels u8]`
//! - accept ack (acceptor → initiator): one `0xA5` byte
//! - packet: `[channel u8][length u32][payload]`
//!
//! TCP gives one reliable ordered byte stream, so channels are a tag on
//! each packet rather than independent lanes, and delivery flags are
//! accepted and ignored. Packets split across reads are reassembled here;
//! the session layer always sees whole packets.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::error::{ProtocolError, Result};
use crate::transport::{Delivery, PeerHandle, Transport, TransportEvent};

const MAGIC: [u8; 4] = *b"MPRO";
const VERSION: u8 = 1;
/// magic + version + hash + channels
const PREAMBLE_LEN: usize = 4 + 1 + 8 + 1;
const ACK: u8 = 0xA5;
/// channel + length
const PACKET_HEADER_LEN: usize = 1 + 4;
/// Cap on one packet's payload. Packets carry concatenated frames, so this
/// sits above the per-frame cap.
const MAX_PACKET_SIZE: usize = 64 * 1024 * 1024;
/// Granularity of the poll wait loop.
const POLL_SLEEP: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Inbound link; preamble not yet read. Not announced to the session.
    AwaitPreamble,
    /// Outbound link; ack not yet read.
    AwaitAck,
    Open,
}

struct Peer {
    stream: TcpStream,
    rx: BytesMut,
    tx: Vec<u8>,
    phase: Phase,
    closing: bool,
}

impl Peer {
    fn new(stream: TcpStream, phase: Phase) -> Self {
        Self {
            stream,
            rx: BytesMut::new(),
            tx: Vec::new(),
            phase,
            closing: false,
        }
    }
}

/// TCP adapter. Use [`bind`](Self::bind) for an accepting endpoint and
/// [`new`](Self::new) for a connect-only one.
pub struct TcpTransport {
    listener: Option<TcpListener>,
    peers: HashMap<PeerHandle, Peer>,
    next_handle: u64,
}

impl TcpTransport {
    /// Connect-only endpoint.
    pub fn new() -> Self {
        Self {
            listener: None,
            peers: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Accepting endpoint bound to `address:port`. Port 0 binds an
    /// ephemeral port, readable via [`local_port`](Self::local_port).
    pub fn bind(address: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((address, port))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        debug!(%addr, "tcp transport listening");
        Ok(Self {
            listener: Some(listener),
            peers: HashMap::new(),
            next_handle: 0,
        })
    }

    /// Bound port of the listening socket, if this endpoint accepts.
    pub fn local_port(&self) -> Option<u16> {
        self.listener
            .as_ref()
            .and_then(|l| l.local_addr().ok())
            .map(|addr| addr.port())
    }

    fn alloc_handle(&mut self) -> PeerHandle {
        self.next_handle += 1;
        PeerHandle(self.next_handle)
    }

    /// One non-blocking pass: accept, flush, read, parse. Pushes any
    /// surfaced events onto `events`.
    fn drive(&mut self, events: &mut Vec<TransportEvent>) {
        self.accept_pending();

        let handles: Vec<PeerHandle> = self.peers.keys().copied().collect();
        let mut dead: Vec<(PeerHandle, bool)> = Vec::new();

        for handle in handles {
            let peer = match self.peers.get_mut(&handle) {
                Some(p) => p,
                None => continue,
            };

            if let Err(e) = flush(peer) {
                trace!(%handle, error = %e, "write failed");
                dead.push((handle, peer.phase != Phase::AwaitPreamble));
                continue;
            }

            if peer.closing && peer.tx.is_empty() {
                let _ = peer.stream.shutdown(Shutdown::Both);
                // Local side of a graceful close hears the disconnect too.
                dead.push((handle, true));
                continue;
            }

            match fill(peer) {
                Ok(true) => {
                    dead.push((handle, peer.phase != Phase::AwaitPreamble));
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    trace!(%handle, error = %e, "read failed");
                    dead.push((handle, peer.phase != Phase::AwaitPreamble));
                    continue;
                }
            }

            match parse(handle, peer, events) {
                Ok(()) => {
                    // A handshake step may have queued the accept ack.
                    let _ = flush(peer);
                }
                Err(reason) => {
                    warn!(%handle, reason, "peer violated transport framing");
                    let _ = peer.stream.shutdown(Shutdown::Both);
                    dead.push((handle, peer.phase != Phase::AwaitPreamble));
                }
            }
        }

        for (handle, announce) in dead {
            self.peers.remove(&handle);
            if announce {
                events.push(TransportEvent::Disconnect { peer: handle });
            }
        }
    }

    fn accept_pending(&mut self) {
        let Some(listener) = &self.listener else {
            return;
        };
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if stream.set_nonblocking(true).is_err() || stream.set_nodelay(true).is_err() {
                        continue;
                    }
                    debug!(%addr, "inbound tcp link");
                    self.next_handle += 1;
                    self.peers.insert(
                        PeerHandle(self.next_handle),
                        Peer::new(stream, Phase::AwaitPreamble),
                    );
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Write as much of the pending tx buffer as the socket takes.
fn flush(peer: &mut Peer) -> std::io::Result<()> {
    while !peer.tx.is_empty() {
        match peer.stream.write(&peer.tx) {
            Ok(0) => return Err(std::io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                peer.tx.drain(..n);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Read everything currently available. Returns `Ok(true)` on EOF.
fn fill(peer: &mut Peer) -> std::io::Result<bool> {
    let mut buf = [0u8; 8192];
    loop {
        match peer.stream.read(&mut buf) {
            Ok(0) => return Ok(true),
            Ok(n) => peer.rx.extend_from_slice(&buf[..n]),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(false),
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Consume whatever complete units sit in the rx buffer for the peer's
/// phase. Returns a violation description on bad framing.
fn parse(
    handle: PeerHandle,
    peer: &mut Peer,
    events: &mut Vec<TransportEvent>,
) -> std::result::Result<(), &'static str> {
    loop {
        match peer.phase {
            Phase::AwaitPreamble => {
                if peer.rx.len() < PREAMBLE_LEN {
                    return Ok(());
                }
                if peer.rx[..4] != MAGIC {
                    return Err("bad magic");
                }
                if peer.rx[4] != VERSION {
                    return Err("unsupported version");
                }
                peer.rx.advance(5);
                let hash = peer.rx.get_u64();
                let _channels = peer.rx.get_u8();
                peer.tx.push(ACK);
                peer.phase = Phase::Open;
                events.push(TransportEvent::Connect { peer: handle, hash });
            }
            Phase::AwaitAck => {
                if peer.rx.is_empty() {
                    return Ok(());
                }
                if peer.rx.get_u8() != ACK {
                    return Err("bad accept ack");
                }
                peer.phase = Phase::Open;
                events.push(TransportEvent::Connect {
                    peer: handle,
                    hash: 0,
                });
            }
            Phase::Open => {
                if peer.rx.len() < PACKET_HEADER_LEN {
                    return Ok(());
                }
                let channel = peer.rx[0];
                let len = u32::from_be_bytes([peer.rx[1], peer.rx[2], peer.rx[3], peer.rx[4]])
                    as usize;
                if len > MAX_PACKET_SIZE {
                    return Err("packet length exceeds maximum");
                }
                if peer.rx.len() < PACKET_HEADER_LEN + len {
                    return Ok(());
                }
                peer.rx.advance(PACKET_HEADER_LEN);
                let data = peer.rx.split_to(len).to_vec();
                events.push(TransportEvent::Receive {
                    peer: handle,
                    channel,
                    data,
                });
            }
        }
    }
}

impl Transport for TcpTransport {
    fn connect(
        &mut self,
        address: &str,
        port: u16,
        hash: u64,
        channels: u8,
    ) -> Result<PeerHandle> {
        let stream = TcpStream::connect((address, port))?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        let mut peer = Peer::new(stream, Phase::AwaitAck);
        peer.tx.extend_from_slice(&MAGIC);
        peer.tx.push(VERSION);
        peer.tx.extend_from_slice(&hash.to_be_bytes());
        peer.tx.push(channels);
        let _ = flush(&mut peer);
        let handle = self.alloc_handle();
        self.peers.insert(handle, peer);
        debug!(%handle, address, port, "tcp connect initiated");
        Ok(handle)
    }

    fn poll(&mut self, timeout: Duration) -> Result<Vec<TransportEvent>> {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();
        loop {
            self.drive(&mut events);
            if !events.is_empty() || Instant::now() >= deadline {
                return Ok(events);
            }
            std::thread::sleep(POLL_SLEEP);
        }
    }

    fn send(
        &mut self,
        peer: PeerHandle,
        data: &[u8],
        channel: u8,
        _delivery: Delivery,
    ) -> Result<()> {
        let entry = self
            .peers
            .get_mut(&peer)
            .ok_or_else(|| ProtocolError::Transport(format!("{peer} is not connected")))?;
        if entry.closing {
            return Err(ProtocolError::Transport(format!("{peer} is closing")));
        }
        entry.tx.push(channel);
        entry.tx.extend_from_slice(&(data.len() as u32).to_be_bytes());
        entry.tx.extend_from_slice(data);
        flush(entry)?;
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerHandle) {
        if let Some(entry) = self.peers.get_mut(&peer) {
            entry.closing = true;
        }
    }

    fn disconnect_now(&mut self, peer: PeerHandle) {
        if let Some(entry) = self.peers.remove(&peer) {
            let _ = entry.stream.shutdown(Shutdown::Both);
        }
    }
}
