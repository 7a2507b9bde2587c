//! Fan-out of accepted mutations to live subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::connection::{
    CloseReason, Connection, ConnectionId, ConnectionState, Delivery, OverflowPolicy,
};
use super::types::MutationEvent;

/// Per-publish delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections that received the event.
    pub delivered: usize,
    /// Of those, connections that had to evict an older event.
    pub evicted: usize,
    /// Connections closed because their queue was full.
    pub disconnected: usize,
}

/// Registry of live connections.
///
/// `publish` copies the current registry under a short read lock and then
/// offers the event to each connection outside it, so registration and
/// unregistration never wait on fan-out and one subscriber never waits on
/// another.
pub struct Broadcaster {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    overflow: OverflowPolicy,
}

impl Broadcaster {
    pub fn new(queue_capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity,
            overflow,
        }
    }

    /// Create a connection for `identity`, add it to the live set, and return
    /// the handle that keeps it registered.
    pub fn register(self: &Arc<Self>, identity: impl Into<String>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = Arc::new(Connection::new(
            id,
            identity.into(),
            self.queue_capacity,
            self.overflow,
        ));

        {
            let mut connections = self.connections.write();
            connections.insert(id, Arc::clone(&connection));
            connection.activate();
        }
        info!(connection = id, identity = connection.identity(), "subscriber registered");

        Subscription {
            connection,
            broadcaster: Arc::clone(self),
        }
    }

    /// Close and remove connection `id`.
    ///
    /// Safe to call repeatedly and from any thread; only the call that closes
    /// the connection removes it. Returns whether this call did so.
    pub fn unregister(&self, id: ConnectionId, reason: CloseReason) -> bool {
        let Some(connection) = self.connections.read().get(&id).cloned() else {
            return false;
        };
        if !connection.close(reason) {
            return false;
        }
        self.connections.write().remove(&id);
        info!(connection = id, reason = ?reason, "subscriber unregistered");
        true
    }

    /// Offer `event` to every connection registered right now.
    pub fn publish(&self, event: Arc<MutationEvent>) -> PublishReport {
        let targets: Vec<Arc<Connection>> = self.connections.read().values().cloned().collect();

        let mut report = PublishReport::default();
        let mut overflowed = Vec::new();
        for connection in &targets {
            match connection.deliver(&event) {
                Delivery::Queued => report.delivered += 1,
                Delivery::DroppedOldest => {
                    report.delivered += 1;
                    report.evicted += 1;
                    warn!(
                        connection = connection.id(),
                        dropped = connection.dropped(),
                        "subscriber lagging, oldest event dropped"
                    );
                }
                Delivery::Overflowed => overflowed.push(connection.id()),
                // Unregistered after the copy was taken.
                Delivery::Rejected => {}
            }
        }

        for id in overflowed {
            if self.unregister(id, CloseReason::SlowConsumer) {
                warn!(connection = id, "slow subscriber disconnected");
                report.disconnected += 1;
            }
        }

        debug!(
            x = event.x,
            y = event.y,
            delivered = report.delivered,
            "event published"
        );
        report
    }

    /// Close every connection.
    pub fn shutdown(&self) -> usize {
        let ids: Vec<ConnectionId> = self.connections.read().keys().copied().collect();
        ids.into_iter()
            .filter(|id| self.unregister(*id, CloseReason::Shutdown))
            .count()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

/// Handle owned by the consumer of one connection.
///
/// Dropping it unregisters the connection, which is how a client disconnect
/// (the transport dropping its stream) retires the subscriber.
pub struct Subscription {
    connection: Arc<Connection>,
    broadcaster: Arc<Broadcaster>,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub async fn recv(&self) -> Option<Arc<MutationEvent>> {
        self.connection.recv().await
    }

    pub fn try_recv(&self) -> Option<Arc<MutationEvent>> {
        self.connection.try_recv()
    }

    /// Unregister with an explicit reason.
    pub fn close(&self, reason: CloseReason) -> bool {
        self.broadcaster.unregister(self.connection.id(), reason)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster
            .unregister(self.connection.id(), CloseReason::ClientGone);
    }
}
