use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::rc::{Rc, Weak};

use bytes::Bytes;
use tracing::{debug, error, trace, warn};

use crate::buffer::ByteBuffer;
use crate::codec::{FrameLength, ProtocolCodec};
use crate::config::Config;
use crate::connection::control::{FlowHandle, FlowState};
use crate::connection::handlers::Handlers;
use crate::connection::{ConnectionInfo, ConnectionState};
use crate::error::Error;
use crate::event::{ConnectionId, EventLoop, Interest, EXIT_HANDLER_FAULT};
use crate::registry::ConnectionRegistry;
#[cfg(feature = "tls")]
use crate::tls::{HandshakeStatus, TlsSession};

/// Result of a [`Connection::send`] call.
///
/// Sends never raise: flow-control and teardown conditions are reported
/// through this value so callers can react (or ignore them, for
/// fire-and-forget traffic).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SendOutcome {
    /// The whole payload hit the socket synchronously.
    Sent,
    /// The payload (or its unsent tail) is parked in the send buffer and
    /// will drain as the socket accepts writes.
    Queued,
    /// The codec produced no bytes for this message; nothing to transmit.
    Skipped,
    /// The payload was dropped: the connection is terminating, the send
    /// buffer is full, or the socket failed.
    Dropped,
}

impl SendOutcome {
    /// Check whether the payload was accepted for (eventual) transmission.
    #[must_use]
    #[inline]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, SendOutcome::Sent | SendOutcome::Queued)
    }

    /// Check whether the payload was dropped.
    #[must_use]
    #[inline]
    pub const fn is_dropped(&self) -> bool {
        matches!(self, SendOutcome::Dropped)
    }
}

/// Construction options for a [`Connection`].
#[derive(Default)]
pub struct ConnectionOptions {
    /// Buffer and frame limits.
    pub config: Config,
    /// Protocol codec; `None` means raw pass-through mode.
    pub codec: Option<Rc<dyn ProtocolCodec>>,
    /// Local socket address, when known.
    pub local_addr: Option<SocketAddr>,
    /// TLS session for encrypted transports; the handshake is driven by
    /// the engine as readiness events arrive.
    #[cfg(feature = "tls")]
    pub tls: Option<TlsSession>,
}

impl ConnectionOptions {
    /// Create options with default limits, no codec, and no TLS.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set buffer and frame limits.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Attach a protocol codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Rc<dyn ProtocolCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Set the local socket address.
    #[must_use]
    pub fn with_local_addr(mut self, addr: SocketAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    /// Attach a TLS session.
    #[cfg(feature = "tls")]
    #[must_use]
    pub fn with_tls(mut self, session: TlsSession) -> Self {
        self.tls = Some(session);
        self
    }
}

/// A non-blocking connection driven by an external event loop.
///
/// The engine owns its socket exclusively and mutates its buffers only from
/// loop callbacks ([`handle_readable`](Self::handle_readable),
/// [`handle_writable`](Self::handle_writable)) or from application methods
/// invoked on the loop thread. Applications receive owned copies of decoded
/// frames, never references into the receive buffer.
///
/// ## Type Parameters
///
/// - `S`: the underlying non-blocking stream (e.g. `mio::net::TcpStream`)
pub struct Connection<S> {
    id: ConnectionId,
    socket: Option<S>,
    remote_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    state: ConnectionState,
    config: Config,
    recv_buffer: ByteBuffer,
    send_buffer: ByteBuffer,
    /// Pending frame-length commitment; 0 means no commitment.
    current_frame_len: usize,
    /// Raised when the buffer-full callback fired for the current crossing;
    /// lowered once the buffer drains below the threshold.
    buffer_full_latch: bool,
    bytes_read: u64,
    bytes_written: u64,
    flow: Rc<FlowState>,
    codec: Option<Rc<dyn ProtocolCodec>>,
    #[cfg(feature = "tls")]
    tls: Option<TlsSession>,
    handlers: Handlers<S>,
    event_loop: Rc<dyn EventLoop>,
    registry: Rc<ConnectionRegistry<S>>,
    self_ref: Weak<RefCell<Self>>,
    read_chunk: Box<[u8]>,
}

impl<S> Connection<S> {
    /// The connection's identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Peer address, when known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Peer IP address, when known.
    #[must_use]
    pub fn remote_ip(&self) -> Option<std::net::IpAddr> {
        self.remote_addr.map(|a| a.ip())
    }

    /// Peer port, when known.
    #[must_use]
    pub fn remote_port(&self) -> Option<u16> {
        self.remote_addr.map(|a| a.port())
    }

    /// Local address, when known.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Total bytes read from the transport.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Total bytes written to the transport.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Check whether the send buffer is empty.
    #[must_use]
    pub fn send_buffer_is_empty(&self) -> bool {
        self.send_buffer.is_empty()
    }

    /// Number of bytes queued in the send buffer.
    #[must_use]
    pub fn send_buffer_len(&self) -> usize {
        self.send_buffer.len()
    }

    /// Number of bytes buffered on the receive side.
    #[must_use]
    pub fn recv_buffer_len(&self) -> usize {
        self.recv_buffer.len()
    }

    /// Check whether inbound delivery is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.flow.paused.get()
    }

    /// The connection's limits.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Override the send buffer capacity for this connection.
    pub fn set_max_send_buffer_size(&mut self, size: usize) {
        self.config.max_send_buffer_size = size;
    }

    /// Override the maximum inbound frame size for this connection.
    pub fn set_max_frame_size(&mut self, size: usize) {
        self.config.max_frame_size = size;
    }

    /// Read-only context handed to codec callbacks.
    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            remote_addr: self.remote_addr,
            local_addr: self.local_addr,
        }
    }

    /// Discard up to `len` bytes from the front of the receive buffer.
    ///
    /// Intended for stateful codecs that consume leading bytes out of band.
    pub fn consume_recv_buffer(&mut self, len: usize) {
        if self.state != ConnectionState::Closed {
            self.recv_buffer.consume(len);
        }
    }

    /// Obtain a clonable pause/resume handle.
    ///
    /// Unlike [`pause_recv`](Self::pause_recv)/[`resume_recv`](Self::resume_recv),
    /// the handle can be invoked from inside any callback, including
    /// callbacks of other connections; [`pipe`](crate::connection::pipe)
    /// uses it for its backpressure coupling.
    #[must_use]
    pub fn flow_handle(&self) -> FlowHandle<S> {
        FlowHandle {
            flow: Rc::clone(&self.flow),
            id: self.id,
            event_loop: Rc::clone(&self.event_loop),
            target: self.self_ref.clone(),
        }
    }

    /// Set the handler invoked with each decoded inbound message.
    ///
    /// Without a codec, the handler receives the whole receive buffer as
    /// one message per read. With no handler registered, inbound data is
    /// discarded to avoid unbounded growth.
    pub fn on_message(
        &mut self,
        handler: impl FnMut(&mut Connection<S>, Bytes) -> super::HandlerResult + 'static,
    ) {
        self.handlers.on_message = Some(Box::new(handler));
    }

    /// Set the handler invoked once when the connection reaches `Closed`.
    pub fn on_close(
        &mut self,
        handler: impl FnMut(&mut Connection<S>) -> super::HandlerResult + 'static,
    ) {
        self.handlers.on_close = Some(Box::new(handler));
    }

    /// Set the handler invoked on connection-level errors (dropped
    /// payloads, dead-socket writes).
    pub fn on_error(
        &mut self,
        handler: impl FnMut(&mut Connection<S>, &Error) -> super::HandlerResult + 'static,
    ) {
        self.handlers.on_error = Some(Box::new(handler));
    }

    /// Set the handler invoked when the send buffer crosses its capacity.
    ///
    /// Fires once per crossing, not once per byte; it re-arms after the
    /// buffer drains back below the threshold.
    pub fn on_buffer_full(
        &mut self,
        handler: impl FnMut(&mut Connection<S>) -> super::HandlerResult + 'static,
    ) {
        self.handlers.on_buffer_full = Some(Box::new(handler));
    }

    /// Set the handler invoked when the send buffer fully drains.
    pub fn on_buffer_drain(
        &mut self,
        handler: impl FnMut(&mut Connection<S>) -> super::HandlerResult + 'static,
    ) {
        self.handlers.on_buffer_drain = Some(Box::new(handler));
    }

    pub(crate) fn socket_mut(&mut self) -> Option<&mut S> {
        self.socket.as_mut()
    }

    fn handshake_pending(&self) -> bool {
        #[cfg(feature = "tls")]
        {
            self.tls.as_ref().is_some_and(|t| !t.is_ready())
        }
        #[cfg(not(feature = "tls"))]
        {
            false
        }
    }

    fn tls_wants_write(&self) -> bool {
        #[cfg(feature = "tls")]
        {
            self.tls.as_ref().is_some_and(TlsSession::wants_write)
        }
        #[cfg(not(feature = "tls"))]
        {
            false
        }
    }

    /// Log a handler or decode fault and signal the loop to terminate the
    /// worker. A faulted handler has already executed under broken
    /// assumptions; it must not keep mutating connection state.
    fn escalate_fault(&mut self, context: &'static str, err: &dyn std::fmt::Display) {
        error!(
            id = self.id,
            context,
            error = %err,
            "handler fault, terminating worker process"
        );
        self.event_loop.terminate(EXIT_HANDLER_FAULT);
    }

    /// Dispatch one decoded message. Returns `false` when processing must
    /// stop: the handler faulted or tore the connection down.
    fn dispatch_message(&mut self, payload: Bytes) -> bool {
        let Some(mut handler) = self.handlers.on_message.take() else {
            return true;
        };
        let result = handler(self, payload);
        if self.state != ConnectionState::Closed && self.handlers.on_message.is_none() {
            self.handlers.on_message = Some(handler);
        }
        match result {
            Ok(()) => self.state != ConnectionState::Closed,
            Err(err) => {
                self.escalate_fault("on_message", &err);
                false
            }
        }
    }

    fn dispatch_close(&mut self) {
        let Some(mut handler) = self.handlers.on_close.take() else {
            return;
        };
        if let Err(err) = handler(self) {
            self.escalate_fault("on_close", &err);
        }
    }

    fn dispatch_error(&mut self, error: &Error) {
        let Some(mut handler) = self.handlers.on_error.take() else {
            return;
        };
        let result = handler(self, error);
        if self.state != ConnectionState::Closed && self.handlers.on_error.is_none() {
            self.handlers.on_error = Some(handler);
        }
        if let Err(err) = result {
            self.escalate_fault("on_error", &err);
        }
    }

    fn dispatch_buffer_full(&mut self) {
        let Some(mut handler) = self.handlers.on_buffer_full.take() else {
            return;
        };
        let result = handler(self);
        if self.state != ConnectionState::Closed && self.handlers.on_buffer_full.is_none() {
            self.handlers.on_buffer_full = Some(handler);
        }
        if let Err(err) = result {
            self.escalate_fault("on_buffer_full", &err);
        }
    }

    fn dispatch_buffer_drain(&mut self) {
        let Some(mut handler) = self.handlers.on_buffer_drain.take() else {
            return;
        };
        let result = handler(self);
        if self.state != ConnectionState::Closed && self.handlers.on_buffer_drain.is_none() {
            self.handlers.on_buffer_drain = Some(handler);
        }
        if let Err(err) = result {
            self.escalate_fault("on_buffer_drain", &err);
        }
    }
}

impl<S: Read + Write> Connection<S> {
    /// Wrap an accepted inbound socket.
    ///
    /// The connection starts `Established` and registers read interest
    /// immediately.
    pub fn accepted(
        socket: S,
        remote_addr: Option<SocketAddr>,
        options: ConnectionOptions,
        event_loop: &Rc<dyn EventLoop>,
        registry: &Rc<ConnectionRegistry<S>>,
    ) -> Rc<RefCell<Self>> {
        let conn = Self::build(
            socket,
            remote_addr,
            options,
            event_loop,
            registry,
            ConnectionState::Established,
        );
        {
            let conn_ref = conn.borrow();
            conn_ref
                .event_loop
                .add_interest(conn_ref.id, Interest::Readable);
        }
        conn
    }

    /// Wrap an outbound socket whose connect is still in flight.
    ///
    /// The connection starts `Connecting` and registers no interest; the
    /// connector calls [`establish`](Self::establish) once the socket is
    /// writable. Payloads sent before then are queued.
    pub fn outbound(
        socket: S,
        remote_addr: Option<SocketAddr>,
        options: ConnectionOptions,
        event_loop: &Rc<dyn EventLoop>,
        registry: &Rc<ConnectionRegistry<S>>,
    ) -> Rc<RefCell<Self>> {
        Self::build(
            socket,
            remote_addr,
            options,
            event_loop,
            registry,
            ConnectionState::Connecting,
        )
    }

    fn build(
        socket: S,
        remote_addr: Option<SocketAddr>,
        options: ConnectionOptions,
        event_loop: &Rc<dyn EventLoop>,
        registry: &Rc<ConnectionRegistry<S>>,
        state: ConnectionState,
    ) -> Rc<RefCell<Self>> {
        let id = registry.allocate_id();
        let config = options.config;
        #[cfg(feature = "tls")]
        let tls = {
            let mut tls = options.tls;
            if let Some(session) = tls.as_mut() {
                session.set_buffer_limit(Some(config.max_send_buffer_size));
            }
            tls
        };
        let read_chunk = vec![0u8; config.read_chunk_size.max(1)].into_boxed_slice();
        let conn = Rc::new_cyclic(|weak: &Weak<RefCell<Self>>| {
            RefCell::new(Self {
                id,
                socket: Some(socket),
                remote_addr,
                local_addr: options.local_addr,
                state,
                config,
                recv_buffer: ByteBuffer::new(),
                send_buffer: ByteBuffer::new(),
                current_frame_len: 0,
                buffer_full_latch: false,
                bytes_read: 0,
                bytes_written: 0,
                flow: Rc::new(FlowState::default()),
                codec: options.codec,
                #[cfg(feature = "tls")]
                tls,
                handlers: Handlers::new(),
                event_loop: Rc::clone(event_loop),
                registry: Rc::clone(registry),
                self_ref: weak.clone(),
                read_chunk,
            })
        });
        registry.insert(id, Rc::clone(&conn));
        trace!(id, ?remote_addr, "connection created");
        conn
    }

    /// Mark an outbound connect as completed.
    ///
    /// Registers read interest, kicks the TLS client flight when present,
    /// and schedules the flush of anything queued while connecting. No-op
    /// unless the connection is `Initial` or `Connecting`.
    pub fn establish(&mut self) {
        if !matches!(
            self.state,
            ConnectionState::Initial | ConnectionState::Connecting
        ) {
            return;
        }
        self.state = ConnectionState::Established;
        self.event_loop.add_interest(self.id, Interest::Readable);

        #[cfg(feature = "tls")]
        if self.handshake_pending() {
            match self.step_handshake() {
                HandshakeStatus::Failed => {
                    self.destroy();
                    return;
                }
                HandshakeStatus::InProgress | HandshakeStatus::Complete => {}
            }
        }

        if (!self.send_buffer.is_empty() && !self.handshake_pending()) || self.tls_wants_write() {
            self.event_loop.add_interest(self.id, Interest::Writable);
        }
    }

    /// Handle a read-readiness notification.
    ///
    /// Drives the TLS handshake while one is pending, then drains the
    /// socket in bounded chunks, running the framing loop after each chunk.
    /// A peer close (zero-length read) or a non-transient read error
    /// destroys the connection. Safe to invoke on a closed connection: it
    /// is a no-op.
    pub fn handle_readable(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        #[cfg(feature = "tls")]
        if self.handshake_pending() {
            match self.step_handshake() {
                HandshakeStatus::InProgress => {
                    // A full socket can hold back our own flight; let
                    // writability push it out.
                    if self.tls_wants_write() {
                        self.event_loop.add_interest(self.id, Interest::Writable);
                    }
                    return;
                }
                HandshakeStatus::Failed => {
                    self.destroy();
                    return;
                }
                HandshakeStatus::Complete => {
                    // Flush anything queued during the handshake window.
                    if !self.send_buffer.is_empty() || self.tls_wants_write() {
                        self.event_loop.add_interest(self.id, Interest::Writable);
                    }
                }
            }
        }

        loop {
            match self.read_once() {
                Ok(0) => {
                    debug!(id = self.id, "peer closed");
                    self.destroy();
                    return;
                }
                Ok(n) => {
                    self.bytes_read += n as u64;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(id = self.id, %err, "read failed");
                    self.destroy();
                    return;
                }
            }
            self.drain_recv_buffer();
            if self.state == ConnectionState::Closed || self.flow.paused.get() {
                return;
            }
        }
        // WouldBlock with no fresh bytes still drains: a deferred resume
        // lands here with frames already buffered.
        self.drain_recv_buffer();
    }

    /// Handle a write-readiness notification.
    ///
    /// Writes as much of the send buffer as the socket accepts in one
    /// non-blocking call. A full drain deregisters write interest and fires
    /// the buffer-drain callback; if a graceful close was pending, the
    /// connection is destroyed now that its last bytes are out.
    pub fn handle_writable(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        #[cfg(feature = "tls")]
        if let (Some(sock), Some(tls)) = (self.socket.as_mut(), self.tls.as_mut()) {
            if let Err(err) = tls.flush(sock) {
                if err.kind() != io::ErrorKind::WouldBlock {
                    debug!(id = self.id, %err, "transport flush failed");
                    self.registry.stats().record_send_failure();
                    self.destroy();
                    return;
                }
            }
        }

        // While the handshake is pending only its records move; queued
        // application data waits for completion.
        if self.handshake_pending() {
            if !self.tls_wants_write() {
                self.event_loop.remove_interest(self.id, Interest::Writable);
            }
            return;
        }

        if self.send_buffer.is_empty() {
            if !self.tls_wants_write() {
                self.event_loop.remove_interest(self.id, Interest::Writable);
            }
            return;
        }

        #[cfg(feature = "tls")]
        let written = {
            let Some(sock) = self.socket.as_mut() else {
                return;
            };
            match self.tls.as_mut() {
                Some(tls) => tls.write(sock, self.send_buffer.as_slice()),
                None => sock.write(self.send_buffer.as_slice()),
            }
        };
        #[cfg(not(feature = "tls"))]
        let written = {
            let Some(sock) = self.socket.as_mut() else {
                return;
            };
            sock.write(self.send_buffer.as_slice())
        };

        match written {
            Ok(n) if n == self.send_buffer.len() => {
                self.bytes_written += n as u64;
                self.send_buffer.clear();
                self.buffer_full_latch = false;
                if !self.tls_wants_write() {
                    self.event_loop.remove_interest(self.id, Interest::Writable);
                }
                self.dispatch_buffer_drain();
                if self.state == ConnectionState::Closing {
                    self.destroy();
                }
            }
            Ok(n) if n > 0 => {
                self.bytes_written += n as u64;
                self.send_buffer.consume(n);
                if self.send_buffer.len() < self.config.max_send_buffer_size {
                    self.buffer_full_latch = false;
                }
            }
            Ok(_) => {
                // Zero-length write on a writable socket: peer is gone.
                self.registry.stats().record_send_failure();
                self.destroy();
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                debug!(id = self.id, %err, "write failed");
                self.registry.stats().record_send_failure();
                self.destroy();
            }
        }
    }

    /// Send a message, encoding it through the codec when one is attached.
    pub fn send(&mut self, payload: &[u8]) -> SendOutcome {
        self.send_inner(payload, false)
    }

    /// Send bytes verbatim, bypassing the codec's encode step.
    pub fn send_raw(&mut self, payload: &[u8]) -> SendOutcome {
        self.send_inner(payload, true)
    }

    fn send_inner(&mut self, payload: &[u8], raw: bool) -> SendOutcome {
        if self.state.is_terminating() {
            return SendOutcome::Dropped;
        }

        let data: Bytes = match (raw, self.codec.clone()) {
            (false, Some(codec)) => match codec.encode(payload, &self.info()) {
                Ok(encoded) if encoded.is_empty() => return SendOutcome::Skipped,
                Ok(encoded) => encoded,
                Err(err) => {
                    warn!(id = self.id, %err, "encode failed");
                    self.dispatch_error(&err);
                    self.destroy();
                    return SendOutcome::Dropped;
                }
            },
            _ => Bytes::copy_from_slice(payload),
        };

        // Not yet transmittable: queue until the transport is up and the
        // handshake (when any) has completed.
        if !self.state.is_established() || self.handshake_pending() {
            if !self.send_buffer.is_empty() && self.send_buffer_full() {
                self.registry.stats().record_send_failure();
                return SendOutcome::Dropped;
            }
            self.send_buffer.push(&data);
            self.check_buffer_will_full();
            return SendOutcome::Queued;
        }

        if self.send_buffer.is_empty() {
            // Fast path: one synchronous non-blocking write.
            match self.write_once(&data) {
                Ok(n) if n == data.len() => {
                    self.bytes_written += n as u64;
                    if self.tls_wants_write() {
                        self.event_loop.add_interest(self.id, Interest::Writable);
                    }
                    SendOutcome::Sent
                }
                Ok(n) if n > 0 => {
                    self.bytes_written += n as u64;
                    self.send_buffer.push(&data[n..]);
                    self.event_loop.add_interest(self.id, Interest::Writable);
                    self.check_buffer_will_full();
                    SendOutcome::Queued
                }
                Ok(_) => {
                    // Zero-length write: the socket no longer accepts data.
                    self.registry.stats().record_send_failure();
                    let err = Error::ConnectionClosed;
                    self.dispatch_error(&err);
                    self.destroy();
                    SendOutcome::Dropped
                }
                Err(err)
                    if err.kind() == io::ErrorKind::WouldBlock
                        || err.kind() == io::ErrorKind::Interrupted =>
                {
                    self.send_buffer.push(&data);
                    self.event_loop.add_interest(self.id, Interest::Writable);
                    self.check_buffer_will_full();
                    SendOutcome::Queued
                }
                Err(err) => {
                    debug!(id = self.id, %err, "send failed");
                    self.registry.stats().record_send_failure();
                    let err = Error::from(err);
                    self.dispatch_error(&err);
                    self.destroy();
                    SendOutcome::Dropped
                }
            }
        } else {
            if self.send_buffer_full() {
                self.registry.stats().record_send_failure();
                return SendOutcome::Dropped;
            }
            self.send_buffer.push(&data);
            self.check_buffer_will_full();
            SendOutcome::Queued
        }
    }

    /// Stop delivering inbound messages.
    ///
    /// Deregisters read interest immediately; a framing drain already in
    /// progress stops before the next frame. Data already buffered stays
    /// buffered until [`resume_recv`](Self::resume_recv).
    pub fn pause_recv(&mut self) {
        self.flow.paused.set(true);
        self.event_loop.remove_interest(self.id, Interest::Readable);
    }

    /// Resume inbound delivery after [`pause_recv`](Self::pause_recv).
    ///
    /// Read interest is re-registered immediately; frames already buffered
    /// drain on the next loop iteration rather than inside the caller's
    /// stack.
    pub fn resume_recv(&mut self)
    where
        S: 'static,
    {
        if !self.flow.paused.replace(false) {
            return;
        }
        self.event_loop.add_interest(self.id, Interest::Readable);
        let target = self.self_ref.clone();
        self.event_loop.defer(Box::new(move || {
            if let Some(conn) = target.upgrade() {
                if let Ok(mut conn) = conn.try_borrow_mut() {
                    conn.handle_readable();
                }
            }
        }));
    }

    /// Close gracefully: queued writes drain first, then the connection is
    /// destroyed. With an empty send buffer this destroys immediately.
    pub fn close(&mut self) {
        self.close_with(None, false);
    }

    /// Send a final payload, then close gracefully.
    ///
    /// The payload goes through the codec unless `raw` is set.
    pub fn close_with(&mut self, data: Option<&[u8]>, raw: bool) {
        if self.state.is_terminating() {
            return;
        }
        if let Some(payload) = data {
            let _ = self.send_inner(payload, raw);
        }
        if self.state == ConnectionState::Closed {
            // The farewell send hit a dead socket and already tore down.
            return;
        }
        self.state = ConnectionState::Closing;
        if self.send_buffer.is_empty() {
            self.destroy();
        } else {
            self.pause_recv();
        }
    }

    /// Destroy the connection immediately.
    ///
    /// Deregisters all interest, releases the socket, abandons any unsent
    /// buffer, fires the close callback once, clears every handler slot,
    /// and removes the connection from the registry. Idempotent: calling it
    /// on a closed connection is a no-op.
    pub fn destroy(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        self.event_loop.remove_interest(self.id, Interest::Readable);
        self.event_loop.remove_interest(self.id, Interest::Writable);
        self.socket = None;
        self.state = ConnectionState::Closed;
        self.recv_buffer.clear();
        self.send_buffer.clear();
        self.current_frame_len = 0;
        debug!(id = self.id, "connection destroyed");

        self.dispatch_close();

        self.handlers.clear();
        self.registry.remove(self.id);
    }

    #[cfg(feature = "tls")]
    fn step_handshake(&mut self) -> HandshakeStatus {
        let (Some(sock), Some(tls)) = (self.socket.as_mut(), self.tls.as_mut()) else {
            return HandshakeStatus::Failed;
        };
        let status = tls.step(sock);
        if status == HandshakeStatus::Failed {
            warn!(id = self.id, "TLS handshake failed");
            let err = Error::HandshakeFailed("negotiation with peer failed".into());
            self.dispatch_error(&err);
        }
        status
    }

    /// One bounded non-blocking read, appended to the receive buffer.
    /// `Ok(0)` means the peer closed.
    fn read_once(&mut self) -> io::Result<usize> {
        let Some(sock) = self.socket.as_mut() else {
            return Ok(0);
        };
        #[cfg(feature = "tls")]
        let n = match self.tls.as_mut() {
            Some(tls) => tls.read(sock, &mut self.read_chunk)?,
            None => sock.read(&mut self.read_chunk)?,
        };
        #[cfg(not(feature = "tls"))]
        let n = sock.read(&mut self.read_chunk)?;
        if n > 0 {
            self.recv_buffer.push(&self.read_chunk[..n]);
        }
        Ok(n)
    }

    fn write_once(&mut self, data: &[u8]) -> io::Result<usize> {
        let Some(sock) = self.socket.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket released",
            ));
        };
        #[cfg(feature = "tls")]
        let n = match self.tls.as_mut() {
            Some(tls) => tls.write(sock, data)?,
            None => sock.write(data)?,
        };
        #[cfg(not(feature = "tls"))]
        let n = sock.write(data)?;
        Ok(n)
    }

    fn drain_recv_buffer(&mut self) {
        match self.codec.clone() {
            Some(codec) => self.drain_framed(&codec),
            None => self.drain_raw(),
        }
    }

    /// Raw pass-through: the whole buffer is one message per read.
    fn drain_raw(&mut self) {
        if self.recv_buffer.is_empty()
            || self.flow.paused.get()
            || self.state == ConnectionState::Closed
        {
            return;
        }
        self.registry.stats().record_request();
        if self.handlers.on_message.is_none() {
            // No consumer: discard instead of growing without bound.
            self.recv_buffer.clear();
            return;
        }
        let payload = self.recv_buffer.take_all();
        self.dispatch_message(payload);
    }

    /// Framing loop: honor the pending length commitment, extract complete
    /// frames, decode, dispatch. The pause flag is re-read every iteration
    /// so a handler pausing mid-drain stops delivery immediately.
    fn drain_framed(&mut self, codec: &Rc<dyn ProtocolCodec>) {
        while !self.recv_buffer.is_empty()
            && !self.flow.paused.get()
            && self.state != ConnectionState::Closed
        {
            if self.current_frame_len == 0 {
                match codec.frame_length(self.recv_buffer.as_slice(), &self.info()) {
                    Ok(FrameLength::Pending) => break,
                    Ok(FrameLength::Complete(len)) => {
                        if len == 0 || self.config.check_frame_size(len).is_err() {
                            error!(
                                id = self.id,
                                frame_len = len,
                                max = self.config.max_frame_size,
                                "invalid frame length"
                            );
                            self.destroy();
                            return;
                        }
                        self.current_frame_len = len;
                    }
                    Err(err) => {
                        error!(id = self.id, %err, "framing violation");
                        self.destroy();
                        return;
                    }
                }
            }

            if self.recv_buffer.len() < self.current_frame_len {
                break;
            }

            let frame = self.recv_buffer.split_to(self.current_frame_len);
            self.current_frame_len = 0;
            self.registry.stats().record_request();

            if self.handlers.on_message.is_none() {
                continue;
            }
            let message = match codec.decode(frame, &self.info()) {
                Ok(message) => message,
                Err(err) => {
                    self.escalate_fault("decode", &err);
                    return;
                }
            };
            if !self.dispatch_message(message) {
                return;
            }
        }
    }

    /// Check capacity before appending to a non-empty send buffer. When
    /// full, report the drop through the error callback and refuse.
    fn send_buffer_full(&mut self) -> bool {
        if self.send_buffer.len() >= self.config.max_send_buffer_size {
            let err = Error::SendBufferFull {
                queued: self.send_buffer.len(),
                max: self.config.max_send_buffer_size,
            };
            self.dispatch_error(&err);
            return true;
        }
        false
    }

    /// Fire the buffer-full callback on a threshold crossing. Latched: it
    /// fires once per crossing and re-arms when the buffer drains below the
    /// threshold.
    fn check_buffer_will_full(&mut self) {
        if self.send_buffer.len() >= self.config.max_send_buffer_size && !self.buffer_full_latch {
            self.buffer_full_latch = true;
            self.dispatch_buffer_full();
        }
    }
}
