//! Shared test harness: scriptable mock streams and a recording event loop.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::rc::Rc;

use wireloop::{
    Connection, ConnectionId, ConnectionOptions, ConnectionRegistry, EventLoop, Interest,
};

#[derive(Default)]
struct MockInner {
    reads: VecDeque<io::Result<Vec<u8>>>,
    eof: bool,
    written: Vec<u8>,
    write_limit: Option<usize>,
    write_blocked: bool,
    write_closed: bool,
}

/// In-memory stream with scripted reads and inspectable writes.
///
/// Cloning yields a second handle to the same stream, so a test keeps one
/// handle while the connection owns the other.
#[derive(Clone, Default)]
pub struct MockStream(Rc<RefCell<MockInner>>);

impl MockStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes to be returned by the next read call.
    pub fn push_read(&self, data: &[u8]) {
        self.0.borrow_mut().reads.push_back(Ok(data.to_vec()));
    }

    /// Queue an error for the next read call.
    pub fn push_read_err(&self, kind: io::ErrorKind) {
        self.0.borrow_mut().reads.push_back(Err(kind.into()));
    }

    /// After the scripted reads are exhausted, report EOF instead of
    /// `WouldBlock`.
    pub fn set_eof(&self) {
        self.0.borrow_mut().eof = true;
    }

    /// Everything written to the stream so far.
    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }

    pub fn clear_written(&self) {
        self.0.borrow_mut().written.clear();
    }

    /// Cap how many bytes each write call accepts (to force partials).
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.0.borrow_mut().write_limit = limit;
    }

    /// Make write calls return `WouldBlock`.
    pub fn set_write_blocked(&self, blocked: bool) {
        self.0.borrow_mut().write_blocked = blocked;
    }

    /// Make write calls return `Ok(0)` (peer gone).
    pub fn set_write_closed(&self) {
        self.0.borrow_mut().write_closed = true;
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        match inner.reads.pop_front() {
            Some(Ok(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    inner.reads.push_front(Ok(data[n..].to_vec()));
                }
                Ok(n)
            }
            Some(Err(err)) => Err(err),
            None => {
                if inner.eof {
                    Ok(0)
                } else {
                    Err(io::ErrorKind::WouldBlock.into())
                }
            }
        }
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.write_blocked {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        if inner.write_closed {
            return Ok(0);
        }
        let n = inner.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        inner.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Event-loop double that records interest changes and queues deferred
/// jobs for explicit pumping.
#[derive(Default)]
pub struct RecordingLoop {
    interests: RefCell<HashSet<(ConnectionId, Interest)>>,
    jobs: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    exit: Cell<Option<i32>>,
}

impl RecordingLoop {
    pub fn is_registered(&self, id: ConnectionId, interest: Interest) -> bool {
        self.interests.borrow().contains(&(id, interest))
    }

    /// Run queued deferred jobs, including jobs they enqueue in turn.
    pub fn pump(&self) {
        loop {
            let job = self.jobs.borrow_mut().pop_front();
            match job {
                Some(job) => job(),
                None => break,
            }
        }
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.borrow().len()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit.get()
    }
}

impl EventLoop for RecordingLoop {
    fn add_interest(&self, id: ConnectionId, interest: Interest) {
        self.interests.borrow_mut().insert((id, interest));
    }

    fn remove_interest(&self, id: ConnectionId, interest: Interest) {
        self.interests.borrow_mut().remove(&(id, interest));
    }

    fn defer(&self, job: Box<dyn FnOnce()>) {
        self.jobs.borrow_mut().push_back(job);
    }

    fn terminate(&self, code: i32) {
        if self.exit.get().is_none() {
            self.exit.set(Some(code));
        }
    }
}

/// One worker's worth of fixtures: a recording loop and a registry.
pub struct TestNet {
    pub event_loop: Rc<RecordingLoop>,
    pub registry: Rc<ConnectionRegistry<MockStream>>,
}

impl TestNet {
    pub fn new() -> Self {
        Self {
            event_loop: Rc::new(RecordingLoop::default()),
            registry: ConnectionRegistry::new(),
        }
    }

    pub fn dyn_loop(&self) -> Rc<dyn EventLoop> {
        self.event_loop.clone()
    }

    pub fn accepted(
        &self,
        stream: &MockStream,
        options: ConnectionOptions,
    ) -> Rc<RefCell<Connection<MockStream>>> {
        Connection::accepted(stream.clone(), None, options, &self.dyn_loop(), &self.registry)
    }

    pub fn outbound(
        &self,
        stream: &MockStream,
        options: ConnectionOptions,
    ) -> Rc<RefCell<Connection<MockStream>>> {
        Connection::outbound(stream.clone(), None, options, &self.dyn_loop(), &self.registry)
    }
}
