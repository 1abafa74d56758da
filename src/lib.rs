//! # wireloop - reactor-style non-blocking connection engine
//!
//! `wireloop` is a callback-driven networking core: each [`Connection`]
//! owns one non-blocking socket, multiplexes it through an event loop,
//! manages read/write buffering with backpressure, drives an optional
//! framing codec, and dispatches lifecycle callbacks to application code.
//!
//! ## Features
//!
//! - **Single-threaded reactor model** - no locks, no async runtime; one
//!   loop per worker drives every connection
//! - **Pluggable framing** via the [`ProtocolCodec`] contract, with
//!   length-prefix and line codecs included
//! - **Backpressure** - bounded send buffers with full/drain callbacks and
//!   payload-drop accounting
//! - **Transparent proxying** - [`pipe`] couples two connections with flow
//!   control in both directions
//! - **TLS** (feature `tls`) - non-blocking rustls handshake and record
//!   layer
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wireloop::{Connection, ConnectionOptions, ConnectionRegistry, LineCodec, Reactor};
//! use std::rc::Rc;
//!
//! let registry = ConnectionRegistry::new();
//! let reactor = Reactor::new(Rc::clone(&registry))?;
//! let event_loop: Rc<dyn wireloop::EventLoop> = reactor.clone();
//!
//! reactor.listen(listener, move |stream, addr| {
//!     let options = ConnectionOptions::new().with_codec(Rc::new(LineCodec::new()));
//!     let conn = Connection::accepted(stream, Some(addr), options, &event_loop, &registry);
//!     conn.borrow_mut().on_message(|conn, line| {
//!         let _ = conn.send(&line);
//!         Ok(())
//!     });
//! })?;
//!
//! std::process::exit(reactor.run()?);
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod reactor;
pub mod registry;

#[cfg(feature = "tls")]
pub mod tls;

pub use buffer::ByteBuffer;
pub use codec::{FrameLength, LengthPrefixCodec, LineCodec, ProtocolCodec};
pub use config::Config;
pub use connection::{
    pipe, Connection, ConnectionInfo, ConnectionOptions, ConnectionState, FlowHandle,
    HandlerError, HandlerResult, SendOutcome,
};
pub use error::{Error, Result};
pub use event::{ConnectionId, EventLoop, Interest, EXIT_HANDLER_FAULT};
pub use reactor::Reactor;
pub use registry::{ConnectionRegistry, Stats};

#[cfg(feature = "tls")]
pub use tls::{HandshakeStatus, TlsRole, TlsSession};
