//! Reentrancy-safe flow control.
//!
//! Pausing and resuming a connection from inside *another* connection's
//! callback (the backpressure half of [`pipe`](crate::connection::pipe))
//! cannot go through `&mut Connection`: the paused connection may be
//! somewhere up the current callback stack. A [`FlowHandle`] carries just
//! the shared pause flag, the connection id, and the loop handle, so it can
//! flip read interest from any callback without touching the engine's
//! exclusive state. The engine re-reads the flag between frames, which is
//! what makes a pause take effect mid-drain.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::connection::Connection;
use crate::event::{ConnectionId, EventLoop, Interest};

/// Shared pause flag, re-read by the engine on every drain iteration.
#[derive(Debug, Default)]
pub(crate) struct FlowState {
    pub paused: Cell<bool>,
}

/// Clonable pause/resume handle for a connection.
///
/// Obtained from [`Connection::flow_handle`]; safe to invoke from inside
/// any callback, including callbacks of the connection it controls.
pub struct FlowHandle<S> {
    pub(crate) flow: Rc<FlowState>,
    pub(crate) id: ConnectionId,
    pub(crate) event_loop: Rc<dyn EventLoop>,
    pub(crate) target: Weak<RefCell<Connection<S>>>,
}

impl<S> Clone for FlowHandle<S> {
    fn clone(&self) -> Self {
        Self {
            flow: Rc::clone(&self.flow),
            id: self.id,
            event_loop: Rc::clone(&self.event_loop),
            target: self.target.clone(),
        }
    }
}

impl<S> FlowHandle<S> {
    /// Stop delivering inbound messages.
    ///
    /// Deregisters read interest and raises the pause flag; a drain already
    /// in progress stops before the next frame.
    pub fn pause(&self) {
        self.flow.paused.set(true);
        self.event_loop.remove_interest(self.id, Interest::Readable);
    }

    /// Resume delivery after a [`pause`](Self::pause).
    ///
    /// Read interest is re-registered immediately; frames already buffered
    /// are drained on the next loop iteration, not inside the current
    /// callback stack.
    pub fn resume(&self)
    where
        S: std::io::Read + std::io::Write + 'static,
    {
        if !self.flow.paused.replace(false) {
            return;
        }
        self.event_loop.add_interest(self.id, Interest::Readable);
        let target = self.target.clone();
        self.event_loop.defer(Box::new(move || {
            if let Some(conn) = target.upgrade() {
                if let Ok(mut conn) = conn.try_borrow_mut() {
                    conn.handle_readable();
                }
            }
        }));
    }

    /// Check whether the connection is currently paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.flow.paused.get()
    }

    /// Identifier of the controlled connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}
