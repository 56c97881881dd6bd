//! Echo demo: a server and a client in one process over the in-memory
//! transport. The client sends ten random-ish strings, the server echoes
//! each one back, and the client prints what returns.
//!
//! Run with: `cargo run --example echo`

use std::sync::Arc;
use std::time::Duration;

use message_protocol::config::ProtocolConfig;
use message_protocol::protocol::{Endpoint, Handler, Message, MessageRegistry};
use message_protocol::session::{Client, Server};
use message_protocol::transport::memory::MemoryNetwork;
use message_protocol::utils::logging;
use message_protocol::Value;

struct EchoServer;

impl Handler for EchoServer {
    fn on_named(&mut self, ep: &mut Endpoint<'_>, msg: &Message, channel: u8) -> bool {
        match msg.name() {
            "echo" => {
                ep.send_on(
                    "echo",
                    msg.values().to_vec(),
                    channel,
                    message_protocol::Delivery::Reliable,
                )
                .expect("echo reply");
                true
            }
            _ => false,
        }
    }
}

struct EchoClient {
    outstanding: u32,
}

impl Handler for EchoClient {
    fn on_connect(&mut self, ep: &mut Endpoint<'_>) {
        println!("connected, sending {} messages", self.outstanding);
        for i in 0..self.outstanding {
            ep.send("echo", vec![Value::from(format!("message {i}"))])
                .expect("send");
        }
    }

    fn on_named(&mut self, ep: &mut Endpoint<'_>, msg: &Message, _channel: u8) -> bool {
        match msg.name() {
            "echo" => {
                let text = msg.field("msg").and_then(Value::as_str).unwrap_or("?");
                println!("echoed back: {text}");
                self.outstanding -= 1;
                if self.outstanding == 0 {
                    ep.request_disconnect();
                }
                true
            }
            _ => false,
        }
    }

    fn on_disconnect(&mut self, _ep: &mut Endpoint<'_>) {
        println!("done");
    }
}

fn main() -> message_protocol::Result<()> {
    let config = ProtocolConfig::default();
    logging::init(&config.logging)?;

    let mut registry = MessageRegistry::with_codec(config.transport.codec);
    registry.register("echo", &["msg"])?;
    let registry = Arc::new(registry);

    let net = MemoryNetwork::new();
    let mut server = Server::new(net.listen(config.server.port), Arc::clone(&registry));
    server.set_connection_limit(config.server.connection_limit);
    server.set_default_handler(|| Box::new(EchoServer));

    let mut client = Client::new(net.client(), registry);
    let peer = client.connect("localhost", config.server.port)?;
    client
        .connection_mut(peer)
        .expect("fresh connection")
        .add_handler(Box::new(EchoClient { outstanding: 10 }));

    let tick = Duration::from_millis(1);
    while client.connection_count() > 0 {
        server.step(tick)?;
        client.step(tick)?;
    }
    server.step(tick)?;

    Ok(())
}
