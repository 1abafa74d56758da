//! Application handler slots.
//!
//! A connection carries five optional handler bindings. Each is invoked at
//! most per its documented trigger, receives the connection itself so it
//! can send, pause, or destroy from inside the callback, and returns a
//! result: a handler returning `Err` is a fault, logged and escalated as a
//! process-fatal condition. All slots are cleared when the connection
//! reaches its terminal state, which both guarantees no callback fires
//! after teardown and breaks the reference cycles created by compositions
//! such as [`pipe`](crate::connection::pipe).

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::Error;

/// Error type an application handler may return.
pub type HandlerError = Box<dyn std::error::Error>;

/// Result returned by application handlers.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Handler invoked with a decoded inbound message.
pub type MessageHandler<S> = Box<dyn FnMut(&mut Connection<S>, Bytes) -> HandlerResult>;

/// Handler invoked on a parameterless lifecycle event.
pub type EventHandler<S> = Box<dyn FnMut(&mut Connection<S>) -> HandlerResult>;

/// Handler invoked with a connection-level error.
pub type ErrorHandler<S> = Box<dyn FnMut(&mut Connection<S>, &Error) -> HandlerResult>;

/// The five handler slots of a connection.
pub(crate) struct Handlers<S> {
    pub on_message: Option<MessageHandler<S>>,
    pub on_close: Option<EventHandler<S>>,
    pub on_error: Option<ErrorHandler<S>>,
    pub on_buffer_full: Option<EventHandler<S>>,
    pub on_buffer_drain: Option<EventHandler<S>>,
}

impl<S> Handlers<S> {
    pub(crate) fn new() -> Self {
        Self {
            on_message: None,
            on_close: None,
            on_error: None,
            on_buffer_full: None,
            on_buffer_drain: None,
        }
    }

    /// Drop every binding. Called exactly once, on the terminal transition.
    pub(crate) fn clear(&mut self) {
        self.on_message = None;
        self.on_close = None;
        self.on_error = None;
        self.on_buffer_full = None;
        self.on_buffer_drain = None;
    }
}

impl<S> Default for Handlers<S> {
    fn default() -> Self {
        Self::new()
    }
}
