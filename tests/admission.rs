//! Hash-gate negotiation: identical registration sequences connect,
//! any schema diff is a hard refusal before message traffic.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use message_protocol::protocol::{Endpoint, Handler, Message, MessageRegistry};
use message_protocol::session::{Client, Server};
use message_protocol::transport::memory::MemoryNetwork;
use message_protocol::{ConnectionState, Value};

const NO_WAIT: Duration = Duration::from_millis(0);
const PORT: u16 = 25500;

fn base_registry() -> MessageRegistry {
    let mut registry = MessageRegistry::new();
    registry.register("echo", &["msg"]).unwrap();
    registry.register("state", &["tick", "players"]).unwrap();
    registry
}

struct CountingHandler {
    received: Rc<RefCell<usize>>,
}

impl Handler for CountingHandler {
    fn on_receive(&mut self, _ep: &mut Endpoint<'_>, _msg: &Message, _channel: u8) {
        *self.received.borrow_mut() += 1;
    }
}

#[test]
fn test_matching_hashes_admit() {
    let net = MemoryNetwork::new();
    let mut server = Server::new(net.listen(PORT), Arc::new(base_registry()));
    let mut client = Client::new(net.client(), Arc::new(base_registry()));

    let peer = client.connect("localhost", PORT).unwrap();
    server.step(NO_WAIT).unwrap();
    client.step(NO_WAIT).unwrap();

    assert_eq!(server.connection_count(), 1);
    assert_eq!(
        client.connection(peer).unwrap().state(),
        ConnectionState::Connected
    );
}

#[test]
fn test_extra_schema_is_refused() {
    let net = MemoryNetwork::new();
    let received = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&received);

    let mut server = Server::new(net.listen(PORT), Arc::new(base_registry()));
    server.set_default_handler(move || {
        Box::new(CountingHandler {
            received: Rc::clone(&counter),
        })
    });

    let mut divergent = base_registry();
    divergent.register("cheat", &["code"]).unwrap();
    let mut client = Client::new(net.client(), Arc::new(divergent));

    let peer = client.connect("localhost", PORT).unwrap();
    server.step(NO_WAIT).unwrap();

    // Refused: no connection object ever exists on the accepting side.
    assert_eq!(server.connection_count(), 0);

    // The client learns of it as an ordinary disconnect.
    client.step(NO_WAIT).unwrap();
    assert_eq!(client.connection_count(), 0);
    assert!(client.connection(peer).is_none());

    // And no dispatch ever happened for that peer.
    assert_eq!(*received.borrow(), 0);
}

#[test]
fn test_reordered_fields_are_refused() {
    let net = MemoryNetwork::new();
    let mut server = Server::new(net.listen(PORT), Arc::new(base_registry()));

    let mut reordered = MessageRegistry::new();
    reordered.register("echo", &["msg"]).unwrap();
    reordered.register("state", &["players", "tick"]).unwrap();
    let mut client = Client::new(net.client(), Arc::new(reordered));

    client.connect("localhost", PORT).unwrap();
    server.step(NO_WAIT).unwrap();
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn test_refused_peer_cannot_deliver_messages() {
    let net = MemoryNetwork::new();
    let received = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&received);
    let mut server = Server::new(net.listen(PORT), Arc::new(base_registry()));
    server.set_default_handler(move || {
        Box::new(CountingHandler {
            received: Rc::clone(&counter),
        })
    });

    let mut divergent = base_registry();
    divergent.register("cheat", &["code"]).unwrap();
    let client_registry = Arc::new(divergent);
    let mut client = Client::new(net.client(), Arc::clone(&client_registry));
    let peer = client.connect("localhost", PORT).unwrap();

    // Fire a message into the gap before either side has stepped. The
    // client-side connection is still Pending, so the send is rejected
    // locally.
    let err = client
        .send(peer, "echo", vec![Value::from("sneaky")])
        .unwrap_err();
    assert!(matches!(
        err,
        message_protocol::ProtocolError::NotConnected
    ));

    server.step(NO_WAIT).unwrap();
    client.step(NO_WAIT).unwrap();
    server.step(NO_WAIT).unwrap();
    assert_eq!(*received.borrow(), 0);
}

#[test]
fn test_connection_limit_refuses_extra_peers() {
    let net = MemoryNetwork::new();
    let mut server = Server::new(net.listen(PORT), Arc::new(base_registry()));
    server.set_connection_limit(1);

    let mut first = Client::new(net.client(), Arc::new(base_registry()));
    first.connect("localhost", PORT).unwrap();
    server.step(NO_WAIT).unwrap();
    first.step(NO_WAIT).unwrap();
    assert_eq!(server.connection_count(), 1);

    let mut second = Client::new(net.client(), Arc::new(base_registry()));
    second.connect("localhost", PORT).unwrap();
    server.step(NO_WAIT).unwrap();
    assert_eq!(server.connection_count(), 1);

    second.step(NO_WAIT).unwrap();
    assert_eq!(second.connection_count(), 0);
}

#[test]
fn test_registration_after_connect_attempt_rejected() {
    let net = MemoryNetwork::new();
    let _server = Server::new(net.listen(PORT), Arc::new(base_registry()));

    let client_registry = Arc::new(base_registry());
    let mut client = Client::new(net.client(), Arc::clone(&client_registry));
    client.connect("localhost", PORT).unwrap();

    // The connect attempt froze the registry for good.
    assert!(client_registry.is_frozen());
}
