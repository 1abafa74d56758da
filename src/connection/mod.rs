//! Connection engine, lifecycle state machine, and composition helpers.
//!
//! The central type is [`Connection`]: it owns one non-blocking socket and
//! its receive/send buffers, registers readiness interest with an
//! [`EventLoop`](crate::event::EventLoop), drives an optional
//! [`ProtocolCodec`](crate::codec::ProtocolCodec) over the inbound stream,
//! and dispatches lifecycle callbacks to application code.
//!
//! ## Lifecycle
//!
//! 1. **Initial / Connecting** - outbound sockets before the transport is up
//! 2. **Established** - data flows; inbound connections start here
//! 3. **Closing** - graceful close requested, queued writes still draining
//! 4. **Closed** - terminal; socket released, handlers cleared
//!
//! ## Example
//!
//! ```rust,ignore
//! use wireloop::{Connection, ConnectionOptions, LineCodec};
//!
//! let conn = Connection::accepted(stream, Some(peer), options, &event_loop, &registry);
//! conn.borrow_mut().on_message(|conn, line| {
//!     let _ = conn.send(&line);
//!     Ok(())
//! });
//! ```

mod control;
mod engine;
mod handlers;
mod pipe;
mod state;

pub use control::FlowHandle;
pub use engine::{Connection, ConnectionOptions, SendOutcome};
pub use handlers::{HandlerError, HandlerResult};
pub use pipe::pipe;
pub use state::ConnectionState;

use std::net::SocketAddr;

use crate::event::ConnectionId;

/// Read-only connection context handed to codec callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// The connection's identifier.
    pub id: ConnectionId,
    /// Peer address, when known.
    pub remote_addr: Option<SocketAddr>,
    /// Local address, when known.
    pub local_addr: Option<SocketAddr>,
}
