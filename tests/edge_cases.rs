//! Edge cases across the protocol layer: framing desync, arity errors,
//! freeze semantics, and sends outside the `Connected` state.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use message_protocol::protocol::MessageRegistry;
use message_protocol::session::{Client, Server};
use message_protocol::transport::memory::MemoryNetwork;
use message_protocol::{Delivery, ProtocolError, Transport, Value};

const NO_WAIT: Duration = Duration::from_millis(0);
const PORT: u16 = 25500;

fn registry() -> Arc<MessageRegistry> {
    let mut registry = MessageRegistry::new();
    registry.register("echo", &["msg"]).unwrap();
    Arc::new(registry)
}

#[test]
fn test_garbage_frame_forces_disconnect() {
    let net = MemoryNetwork::new();
    let mut server = Server::new(net.listen(PORT), registry());
    let mut client = Client::new(net.client(), registry());
    let peer = client.connect("localhost", PORT).unwrap();
    server.step(NO_WAIT).unwrap();
    client.step(NO_WAIT).unwrap();
    assert_eq!(server.connection_count(), 1);

    // Bypass the registry and push raw garbage through the transport.
    let handle = client.connection(peer).unwrap().peer();
    client
        .transport_mut()
        .send(handle, &[0xFF, 0xEE, 0xDD], 0, Delivery::Reliable)
        .unwrap();

    server.step(NO_WAIT).unwrap();
    // Framing desync is unrecoverable: the server force-disconnects.
    assert_eq!(server.connection_count(), 0);

    client.step(NO_WAIT).unwrap();
    assert_eq!(client.connection_count(), 0);
}

#[test]
fn test_unknown_schema_id_forces_disconnect() {
    let net = MemoryNetwork::new();
    let mut server = Server::new(net.listen(PORT), registry());
    let mut client = Client::new(net.client(), registry());
    let peer = client.connect("localhost", PORT).unwrap();
    server.step(NO_WAIT).unwrap();
    client.step(NO_WAIT).unwrap();

    // Well-formed header, but schema id 99 was never registered.
    let mut frame = Vec::new();
    frame.extend_from_slice(&99u16.to_be_bytes());
    frame.extend_from_slice(&0u32.to_be_bytes());
    let handle = client.connection(peer).unwrap().peer();
    client
        .transport_mut()
        .send(handle, &frame, 0, Delivery::Reliable)
        .unwrap();

    server.step(NO_WAIT).unwrap();
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn test_valid_frames_before_corrupt_one_still_count() {
    let net = MemoryNetwork::new();
    let mut server = Server::new(net.listen(PORT), registry());
    let mut client = Client::new(net.client(), registry());
    let peer = client.connect("localhost", PORT).unwrap();
    server.step(NO_WAIT).unwrap();
    client.step(NO_WAIT).unwrap();

    // One good frame followed by a truncated one in the same packet.
    let reference = registry();
    let good = reference
        .pack(&reference.construct("echo", vec![Value::from("ok")]).unwrap())
        .unwrap();
    let mut packet = good.clone();
    packet.extend_from_slice(&good[..good.len() - 1]);

    let handle = client.connection(peer).unwrap().peer();
    client
        .transport_mut()
        .send(handle, &packet, 0, Delivery::Reliable)
        .unwrap();
    server.step(NO_WAIT).unwrap();

    // The desync still tears the link down.
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn test_send_arity_error_is_local_and_recoverable() {
    let net = MemoryNetwork::new();
    let mut server = Server::new(net.listen(PORT), registry());
    let mut client = Client::new(net.client(), registry());
    let peer = client.connect("localhost", PORT).unwrap();
    server.step(NO_WAIT).unwrap();
    client.step(NO_WAIT).unwrap();

    let err = client.send(peer, "echo", vec![]).unwrap_err();
    match err {
        ProtocolError::ArgumentCount {
            name,
            expected,
            given,
        } => {
            assert_eq!(name, "echo");
            assert_eq!(expected, 1);
            assert_eq!(given, 0);
        }
        other => panic!("expected ArgumentCount, got {other:?}"),
    }

    // A failed construction never hits the wire or the counters.
    assert_eq!(client.connection(peer).unwrap().stats().messages_sent, 0);

    // The caller corrects the arguments and the link is still healthy.
    client.send(peer, "echo", vec![Value::from("ok")]).unwrap();
    server.step(NO_WAIT).unwrap();
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn test_send_before_connect_confirmation() {
    let net = MemoryNetwork::new();
    let _server = Server::new(net.listen(PORT), registry());
    let mut client = Client::new(net.client(), registry());
    let peer = client.connect("localhost", PORT).unwrap();

    // Still Pending: the transport confirmation has not been polled yet.
    let err = client
        .send(peer, "echo", vec![Value::from("x")])
        .unwrap_err();
    assert!(matches!(err, ProtocolError::NotConnected));
}

#[test]
fn test_send_to_unknown_peer() {
    let net = MemoryNetwork::new();
    let mut client = Client::new(net.client(), registry());
    let err = client
        .send(message_protocol::PeerId(7), "echo", vec![Value::from("x")])
        .unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownPeer(7)));
}

#[test]
fn test_server_construction_freezes_registry() {
    let registry = registry();
    let net = MemoryNetwork::new();
    let _server = Server::new(net.listen(PORT), Arc::clone(&registry));
    assert!(registry.is_frozen());
}

#[test]
fn test_graceful_disconnect_is_cooperative() {
    let net = MemoryNetwork::new();
    let mut server = Server::new(net.listen(PORT), registry());
    let mut client = Client::new(net.client(), registry());
    let peer = client.connect("localhost", PORT).unwrap();
    server.step(NO_WAIT).unwrap();
    client.step(NO_WAIT).unwrap();

    client.disconnect(peer).unwrap();

    // Intent is recorded, but the state only changes when the transport
    // surfaces the event on a later step.
    let conn = client.connection(peer).unwrap();
    assert!(conn.disconnect_requested());
    assert!(conn.is_connected());

    client.step(NO_WAIT).unwrap();
    assert!(client.connection(peer).is_none());
}
