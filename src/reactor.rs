//! Bundled single-threaded event loop.
//!
//! A thin mio `Poll` wrapper implementing the [`EventLoop`] boundary. One
//! reactor drives all connections of a worker: it polls for readiness,
//! dispatches to the owning connection, runs deferred jobs, and applies
//! interest changes between dispatch rounds (connections request interest
//! changes from inside their own callbacks, when their sockets cannot be
//! re-registered on the spot).
//!
//! The engine itself has no dependency on this module; any loop
//! implementing [`EventLoop`] can drive it.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use mio::event::Source;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest as MioInterest, Poll, Token};
use tracing::{trace, warn};

use crate::event::{ConnectionId, EventLoop, Interest};
use crate::registry::ConnectionRegistry;

/// Token reserved for the listening socket; never allocated to connections.
const ACCEPT_TOKEN: Token = Token(usize::MAX);

type AcceptCallback = Box<dyn FnMut(TcpStream, SocketAddr)>;

struct Acceptor {
    listener: TcpListener,
    on_accept: AcceptCallback,
}

#[derive(Debug, Default, Clone, Copy)]
struct InterestEntry {
    readable: bool,
    writable: bool,
    registered: bool,
}

impl InterestEntry {
    fn desired(&self) -> Option<MioInterest> {
        match (self.readable, self.writable) {
            (true, true) => Some(MioInterest::READABLE | MioInterest::WRITABLE),
            (true, false) => Some(MioInterest::READABLE),
            (false, true) => Some(MioInterest::WRITABLE),
            (false, false) => None,
        }
    }
}

enum InterestOp {
    Add(ConnectionId, Interest),
    Remove(ConnectionId, Interest),
}

/// mio-backed reactor driving the connections of one worker.
pub struct Reactor<S: Source> {
    poll: RefCell<Poll>,
    registry: Rc<ConnectionRegistry<S>>,
    interest: RefCell<HashMap<ConnectionId, InterestEntry>>,
    pending: RefCell<Vec<InterestOp>>,
    jobs: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    exit_code: Cell<Option<i32>>,
    acceptor: RefCell<Option<Acceptor>>,
}

impl<S: Source + Read + Write> Reactor<S> {
    /// Create a reactor over the given registry.
    ///
    /// # Errors
    ///
    /// Returns the underlying error if the OS poller cannot be created.
    pub fn new(registry: Rc<ConnectionRegistry<S>>) -> io::Result<Rc<Self>> {
        Ok(Rc::new(Self {
            poll: RefCell::new(Poll::new()?),
            registry,
            interest: RefCell::new(HashMap::new()),
            pending: RefCell::new(Vec::new()),
            jobs: RefCell::new(VecDeque::new()),
            exit_code: Cell::new(None),
            acceptor: RefCell::new(None),
        }))
    }

    /// The registry this reactor dispatches into.
    #[must_use]
    pub fn registry(&self) -> &Rc<ConnectionRegistry<S>> {
        &self.registry
    }

    /// Attach a listening socket.
    ///
    /// `on_accept` runs once per accepted socket and typically wraps it via
    /// [`Connection::accepted`](crate::connection::Connection::accepted).
    ///
    /// # Errors
    ///
    /// Returns the underlying error if the listener cannot be registered.
    pub fn listen(
        &self,
        mut listener: TcpListener,
        on_accept: impl FnMut(TcpStream, SocketAddr) + 'static,
    ) -> io::Result<()> {
        self.poll
            .borrow()
            .registry()
            .register(&mut listener, ACCEPT_TOKEN, MioInterest::READABLE)?;
        *self.acceptor.borrow_mut() = Some(Acceptor {
            listener,
            on_accept: Box::new(on_accept),
        });
        Ok(())
    }

    /// Request a clean exit with code 0.
    pub fn shutdown(&self) {
        self.terminate(0);
    }

    /// Run until termination is requested.
    ///
    /// Returns the exit code passed to [`EventLoop::terminate`].
    ///
    /// # Errors
    ///
    /// Returns the underlying error if polling fails.
    pub fn run(&self) -> io::Result<i32> {
        let mut events = Events::with_capacity(1024);
        loop {
            self.run_jobs();
            self.apply_interest_ops();
            if let Some(code) = self.exit_code.get() {
                return Ok(code);
            }

            match self.poll.borrow_mut().poll(&mut events, None) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }

            for event in events.iter() {
                let token = event.token();
                if token == ACCEPT_TOKEN {
                    self.accept_ready();
                    continue;
                }
                let id = token.0;
                if event.is_readable() || event.is_read_closed() {
                    self.dispatch_readable(id);
                }
                if event.is_writable() || event.is_write_closed() {
                    self.dispatch_writable(id);
                }
            }
            self.run_jobs();
        }
    }

    /// Drive one poll round with a timeout, for callers embedding the
    /// reactor in their own loop. Returns the exit code once termination
    /// has been requested.
    ///
    /// # Errors
    ///
    /// Returns the underlying error if polling fails.
    pub fn run_once(&self, timeout: Option<Duration>) -> io::Result<Option<i32>> {
        self.run_jobs();
        self.apply_interest_ops();
        if let Some(code) = self.exit_code.get() {
            return Ok(Some(code));
        }

        let mut events = Events::with_capacity(256);
        match self.poll.borrow_mut().poll(&mut events, timeout) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(err) => return Err(err),
        }
        for event in events.iter() {
            let token = event.token();
            if token == ACCEPT_TOKEN {
                self.accept_ready();
                continue;
            }
            let id = token.0;
            if event.is_readable() || event.is_read_closed() {
                self.dispatch_readable(id);
            }
            if event.is_writable() || event.is_write_closed() {
                self.dispatch_writable(id);
            }
        }
        self.run_jobs();
        Ok(self.exit_code.get())
    }

    fn dispatch_readable(&self, id: ConnectionId) {
        // A missing or busy entry means the connection died earlier in
        // this round; stale readiness is a no-op.
        let Some(conn) = self.registry.get(id) else {
            return;
        };
        if let Ok(mut conn) = conn.try_borrow_mut() {
            conn.handle_readable();
        }
    }

    fn dispatch_writable(&self, id: ConnectionId) {
        let Some(conn) = self.registry.get(id) else {
            return;
        };
        if let Ok(mut conn) = conn.try_borrow_mut() {
            conn.handle_writable();
        }
    }

    fn accept_ready(&self) {
        let mut guard = self.acceptor.borrow_mut();
        let Some(acceptor) = guard.as_mut() else {
            return;
        };
        loop {
            match acceptor.listener.accept() {
                Ok((stream, addr)) => {
                    trace!(%addr, "accepted");
                    (acceptor.on_accept)(stream, addr);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(%err, "accept failed");
                    return;
                }
            }
        }
    }

    fn run_jobs(&self) {
        loop {
            let job = self.jobs.borrow_mut().pop_front();
            match job {
                Some(job) => job(),
                None => break,
            }
        }
    }

    fn apply_interest_ops(&self) {
        let ops = std::mem::take(&mut *self.pending.borrow_mut());
        for op in ops {
            let (id, kind, on) = match op {
                InterestOp::Add(id, kind) => (id, kind, true),
                InterestOp::Remove(id, kind) => (id, kind, false),
            };

            let (desired, was_registered) = {
                let mut map = self.interest.borrow_mut();
                let entry = map.entry(id).or_default();
                match kind {
                    Interest::Readable => entry.readable = on,
                    Interest::Writable => entry.writable = on,
                }
                let desired = entry.desired();
                let was_registered = entry.registered;
                entry.registered = desired.is_some();
                if desired.is_none() {
                    map.remove(&id);
                }
                (desired, was_registered)
            };

            let Some(conn) = self.registry.get(id) else {
                // Connection already torn down; closing the socket removed
                // it from the poller.
                self.interest.borrow_mut().remove(&id);
                continue;
            };
            let Ok(mut conn) = conn.try_borrow_mut() else {
                continue;
            };
            let Some(sock) = conn.socket_mut() else {
                continue;
            };

            let poll = self.poll.borrow();
            let result = match (desired, was_registered) {
                (Some(interests), true) => poll.registry().reregister(sock, Token(id), interests),
                (Some(interests), false) => poll.registry().register(sock, Token(id), interests),
                (None, true) => poll.registry().deregister(sock),
                (None, false) => Ok(()),
            };
            if let Err(err) = result {
                warn!(id, %err, "interest update failed");
            }
        }
    }
}

impl<S: Source + Read + Write> EventLoop for Reactor<S> {
    fn add_interest(&self, id: ConnectionId, interest: Interest) {
        self.pending.borrow_mut().push(InterestOp::Add(id, interest));
    }

    fn remove_interest(&self, id: ConnectionId, interest: Interest) {
        self.pending
            .borrow_mut()
            .push(InterestOp::Remove(id, interest));
    }

    fn defer(&self, job: Box<dyn FnOnce()>) {
        self.jobs.borrow_mut().push_back(job);
    }

    fn terminate(&self, code: i32) {
        if self.exit_code.get().is_none() {
            self.exit_code.set(Some(code));
        }
    }
}
