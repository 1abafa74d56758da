//! Process-wide connection registry and aggregate counters.
//!
//! One registry exists per worker. It allocates connection identifiers,
//! maps live identifiers to their connections for event dispatch and
//! graceful-shutdown draining, and keeps the worker's aggregate counters.
//! Everything lives on the loop thread: interior mutability, no locking.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::connection::Connection;
use crate::event::ConnectionId;

/// Aggregate per-worker counters.
#[derive(Debug, Default)]
pub struct Stats {
    active: Cell<usize>,
    total_requests: Cell<u64>,
    send_failures: Cell<u64>,
}

impl Stats {
    /// Number of currently live connections.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.get()
    }

    /// Total inbound messages/frames processed across all connections.
    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.total_requests.get()
    }

    /// Total payloads dropped by failed or refused sends.
    #[must_use]
    pub fn send_failures(&self) -> u64 {
        self.send_failures.get()
    }

    pub(crate) fn record_request(&self) {
        self.total_requests.set(self.total_requests.get() + 1);
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.set(self.send_failures.get() + 1);
    }

    fn record_connect(&self) {
        self.active.set(self.active.get() + 1);
    }

    fn record_disconnect(&self) {
        self.active.set(self.active.get().saturating_sub(1));
    }
}

/// Map from connection identifier to live connection, plus [`Stats`].
///
/// Entries are inserted at construction and removed by `destroy`; an
/// identifier absent from the registry is either already torn down or was
/// never allocated, and readiness events for it are ignored.
pub struct ConnectionRegistry<S> {
    connections: RefCell<HashMap<ConnectionId, Rc<RefCell<Connection<S>>>>>,
    next_id: Cell<ConnectionId>,
    stats: Stats,
}

impl<S> ConnectionRegistry<S> {
    /// Create an empty registry. Identifiers start at 1.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            connections: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            stats: Stats::default(),
        })
    }

    /// Allocate the next identifier.
    ///
    /// Wraps to zero at the platform maximum; `ConnectionId::MAX` itself is
    /// never handed out (the bundled reactor reserves it). Reuse after
    /// wraparound is harmless because old entries have long been removed.
    pub(crate) fn allocate_id(&self) -> ConnectionId {
        let id = self.next_id.get();
        let next = id.wrapping_add(1);
        self.next_id
            .set(if next == ConnectionId::MAX { 0 } else { next });
        id
    }

    pub(crate) fn insert(&self, id: ConnectionId, conn: Rc<RefCell<Connection<S>>>) {
        self.connections.borrow_mut().insert(id, conn);
        self.stats.record_connect();
    }

    pub(crate) fn remove(&self, id: ConnectionId) {
        if self.connections.borrow_mut().remove(&id).is_some() {
            self.stats.record_disconnect();
        }
    }

    /// Look up a live connection.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<Rc<RefCell<Connection<S>>>> {
        self.connections.borrow().get(&id).cloned()
    }

    /// Check whether an identifier is live.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.borrow().contains_key(&id)
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.borrow().len()
    }

    /// Check whether no connections are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.borrow().is_empty()
    }

    /// Identifiers of all live connections.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.borrow().keys().copied().collect()
    }

    /// Aggregate counters for this worker.
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}

impl<S: std::io::Read + std::io::Write> ConnectionRegistry<S> {
    /// Gracefully close every live connection.
    ///
    /// Connections with queued writes linger in `Closing` until they drain;
    /// the worker keeps running its loop until [`is_empty`](Self::is_empty).
    pub fn close_all(&self) {
        let snapshot: Vec<_> = self.connections.borrow().values().cloned().collect();
        for conn in snapshot {
            if let Ok(mut conn) = conn.try_borrow_mut() {
                conn.close();
            }
        }
    }

    /// Immediately destroy every live connection, abandoning unsent data.
    pub fn destroy_all(&self) {
        let snapshot: Vec<_> = self.connections.borrow().values().cloned().collect();
        for conn in snapshot {
            if let Ok(mut conn) = conn.try_borrow_mut() {
                conn.destroy();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_allocation_is_monotonic() {
        let registry: Rc<ConnectionRegistry<std::io::Cursor<Vec<u8>>>> = ConnectionRegistry::new();
        assert_eq!(registry.allocate_id(), 1);
        assert_eq!(registry.allocate_id(), 2);
        assert_eq!(registry.allocate_id(), 3);
    }

    #[test]
    fn test_id_allocation_wraps_at_max() {
        let registry: Rc<ConnectionRegistry<std::io::Cursor<Vec<u8>>>> = ConnectionRegistry::new();
        registry.next_id.set(ConnectionId::MAX - 1);
        assert_eq!(registry.allocate_id(), ConnectionId::MAX - 1);
        // MAX is reserved; the allocator restarts from zero.
        assert_eq!(registry.allocate_id(), 0);
        assert_eq!(registry.allocate_id(), 1);
    }

    #[test]
    fn test_stats_counters() {
        let stats = Stats::default();
        stats.record_request();
        stats.record_request();
        stats.record_send_failure();
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.send_failures(), 1);
        assert_eq!(stats.active(), 0);
    }

    #[test]
    fn test_disconnect_saturates_at_zero() {
        let stats = Stats::default();
        stats.record_disconnect();
        assert_eq!(stats.active(), 0);
    }

    #[test]
    fn test_empty_registry() {
        let registry: Rc<ConnectionRegistry<std::io::Cursor<Vec<u8>>>> = ConnectionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(!registry.contains(1));
        assert!(registry.get(1).is_none());
    }
}
