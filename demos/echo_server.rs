//! Line-based echo server.
//!
//! Run with `cargo run --example echo_server`, then `nc 127.0.0.1 9123`
//! and type lines.

use std::process;
use std::rc::Rc;

use mio::net::TcpListener;
use tracing::info;
use wireloop::{Connection, ConnectionOptions, ConnectionRegistry, EventLoop, LineCodec, Reactor};

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addr = "127.0.0.1:9123".parse().unwrap();
    let listener = TcpListener::bind(addr)?;

    let registry = ConnectionRegistry::new();
    let reactor = Reactor::new(Rc::clone(&registry))?;
    let event_loop: Rc<dyn EventLoop> = reactor.clone();
    let codec = Rc::new(LineCodec::new());

    let accept_registry = Rc::clone(&registry);
    reactor.listen(listener, move |stream, peer| {
        let options = ConnectionOptions::new().with_codec(codec.clone());
        let conn = Connection::accepted(stream, Some(peer), options, &event_loop, &accept_registry);
        let mut conn = conn.borrow_mut();
        info!(id = conn.id(), %peer, "client connected");
        conn.on_message(|conn, line| {
            let _ = conn.send(&line);
            Ok(())
        });
        conn.on_close(|conn| {
            info!(id = conn.id(), "client gone");
            Ok(())
        });
    })?;

    info!(%addr, "echo server listening");
    let code = reactor.run()?;
    process::exit(code);
}
