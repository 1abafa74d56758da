//! Event-loop boundary.
//!
//! The engine never polls sockets itself; it registers interest with an
//! event loop and reacts to readiness notifications. This module defines
//! that boundary as a trait so the engine can be driven by the bundled
//! [`Reactor`](crate::reactor::Reactor), or by any host loop, or by a test
//! double.

/// Process-wide connection identifier.
///
/// Allocated by the registry; monotonically increasing, wrapping to zero
/// when the platform maximum is reached. Unique among live connections.
pub type ConnectionId = usize;

/// Exit code reported when an application handler fault terminates the
/// worker process.
pub const EXIT_HANDLER_FAULT: i32 = 250;

/// Kind of socket readiness a connection registers interest in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    /// Socket has data to read (or a pending handshake record).
    Readable,
    /// Socket can accept writes.
    Writable,
}

/// Contract between a connection and the loop that drives it.
///
/// All methods take `&self`: they are invoked from inside connection
/// callbacks on the loop's own thread, so implementations use interior
/// mutability and apply interest changes between dispatch rounds. The model
/// is strictly single-threaded; implementations are not required to be
/// `Send` or `Sync`.
pub trait EventLoop {
    /// Register interest in a readiness kind for a connection's socket.
    ///
    /// Adding an interest that is already registered is a no-op.
    fn add_interest(&self, id: ConnectionId, interest: Interest);

    /// Deregister interest in a readiness kind.
    ///
    /// Removing an interest that is not registered is a no-op.
    fn remove_interest(&self, id: ConnectionId, interest: Interest);

    /// Queue a job to run after the current dispatch round completes.
    ///
    /// This is the reactor-yield primitive: work that must not run inside
    /// the current callback stack (such as draining buffered frames after a
    /// resume) is deferred to the next loop iteration.
    fn defer(&self, job: Box<dyn FnOnce()>);

    /// Request process termination with the given exit code.
    ///
    /// Called when an application handler faults: the engine has logged the
    /// fault and must not keep running with a handler that has already
    /// executed under broken assumptions. The loop finishes the current
    /// round and exits. Note that this tears down the whole worker, not one
    /// connection; hosts multiplexing unrelated tenants onto one worker
    /// should take that into account.
    fn terminate(&self, code: i32);
}
