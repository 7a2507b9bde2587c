//! Subscriber connections and their bounded outgoing queues.
//!
//! A [`Connection`] moves `Connecting -> Live -> Closed`. Only the
//! [`Broadcaster`](super::broadcast::Broadcaster) drives those transitions;
//! consumers read events through [`Connection::recv`].

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use super::types::MutationEvent;

pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Live,
    Closed,
}

/// What to do when a subscriber's queue is full at publish time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued event to make room.
    #[default]
    DropOldest,
    /// Close the connection.
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client went away (stream dropped, transport closed).
    ClientGone,
    /// The queue overflowed under [`OverflowPolicy::Disconnect`].
    SlowConsumer,
    /// The broadcaster is shutting down.
    Shutdown,
}

/// Result of offering one event to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queued after evicting the oldest pending event.
    DroppedOldest,
    /// Queue full under [`OverflowPolicy::Disconnect`]; nothing was queued.
    Overflowed,
    /// The connection is not live.
    Rejected,
}

struct Inner {
    state: ConnectionState,
    queue: VecDeque<Arc<MutationEvent>>,
    dropped: u64,
    close_reason: Option<CloseReason>,
}

/// One live subscriber.
pub struct Connection {
    id: ConnectionId,
    identity: String,
    capacity: usize,
    policy: OverflowPolicy,
    inner: Mutex<Inner>,
    wake: Notify,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        identity: String,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Self {
        Self {
            id,
            identity,
            capacity: capacity.max(1),
            policy,
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                queue: VecDeque::new(),
                dropped: 0,
                close_reason: None,
            }),
            wake: Notify::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.inner.lock().close_reason
    }

    /// Events evicted under [`OverflowPolicy::DropOldest`].
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    /// Events currently waiting to be read.
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// `Connecting -> Live`. Returns `false` for any other starting state.
    pub(crate) fn activate(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Connecting {
            return false;
        }
        inner.state = ConnectionState::Live;
        true
    }

    /// Move to `Closed` and drop anything still queued.
    ///
    /// Returns `true` only for the call that performed the transition, so a
    /// caller can tie one-time cleanup to it.
    pub(crate) fn close(&self, reason: CloseReason) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Closed {
                return false;
            }
            inner.state = ConnectionState::Closed;
            inner.close_reason = Some(reason);
            inner.queue.clear();
        }
        self.wake.notify_one();
        true
    }

    /// Offer `event` without blocking. State is checked under the queue lock,
    /// so nothing is queued once `close` has returned.
    pub(crate) fn deliver(&self, event: &Arc<MutationEvent>) -> Delivery {
        let outcome = {
            let mut inner = self.inner.lock();
            if inner.state != ConnectionState::Live {
                return Delivery::Rejected;
            }
            if inner.queue.len() < self.capacity {
                inner.queue.push_back(Arc::clone(event));
                Delivery::Queued
            } else {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        inner.queue.pop_front();
                        inner.queue.push_back(Arc::clone(event));
                        inner.dropped += 1;
                        Delivery::DroppedOldest
                    }
                    OverflowPolicy::Disconnect => return Delivery::Overflowed,
                }
            }
        };
        self.wake.notify_one();
        outcome
    }

    /// Next queued event, waiting if the queue is empty.
    ///
    /// Returns `None` once the connection is closed.
    pub async fn recv(&self) -> Option<Arc<MutationEvent>> {
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(event) = inner.queue.pop_front() {
                    return Some(event);
                }
                if inner.state == ConnectionState::Closed {
                    return None;
                }
            }
            // `notify_one` leaves a permit when nobody is waiting, so a push
            // between the check above and this await is not lost.
            self.wake.notified().await;
        }
    }

    /// Next queued event, if any, without waiting.
    pub fn try_recv(&self) -> Option<Arc<MutationEvent>> {
        self.inner.lock().queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::color::Color;

    fn event(x: u32) -> Arc<MutationEvent> {
        Arc::new(MutationEvent {
            x,
            y: 0,
            color: Color::Red,
            editor: "a".to_string(),
        })
    }

    fn live(capacity: usize, policy: OverflowPolicy) -> Connection {
        let conn = Connection::new(1, "viewer".to_string(), capacity, policy);
        assert!(conn.activate());
        conn
    }

    #[test]
    fn lifecycle_moves_forward_only() {
        let conn = Connection::new(7, "viewer".to_string(), 4, OverflowPolicy::DropOldest);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(conn.deliver(&event(0)), Delivery::Rejected);

        assert!(conn.activate());
        assert!(!conn.activate());
        assert_eq!(conn.state(), ConnectionState::Live);

        assert!(conn.close(CloseReason::ClientGone));
        assert!(!conn.close(CloseReason::Shutdown));
        assert!(!conn.activate());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.close_reason(), Some(CloseReason::ClientGone));
    }

    #[test]
    fn drop_oldest_keeps_newest_events() {
        let conn = live(2, OverflowPolicy::DropOldest);
        assert_eq!(conn.deliver(&event(0)), Delivery::Queued);
        assert_eq!(conn.deliver(&event(1)), Delivery::Queued);
        assert_eq!(conn.deliver(&event(2)), Delivery::DroppedOldest);

        assert_eq!(conn.dropped(), 1);
        assert_eq!(conn.try_recv().map(|e| e.x), Some(1));
        assert_eq!(conn.try_recv().map(|e| e.x), Some(2));
        assert_eq!(conn.try_recv(), None);
    }

    #[test]
    fn disconnect_policy_reports_overflow() {
        let conn = live(1, OverflowPolicy::Disconnect);
        assert_eq!(conn.deliver(&event(0)), Delivery::Queued);
        assert_eq!(conn.deliver(&event(1)), Delivery::Overflowed);
        assert_eq!(conn.pending(), 1);
    }

    #[test]
    fn close_discards_queued_events() {
        let conn = live(4, OverflowPolicy::DropOldest);
        conn.deliver(&event(0));
        conn.close(CloseReason::Shutdown);
        assert_eq!(conn.pending(), 0);
        assert_eq!(conn.deliver(&event(1)), Delivery::Rejected);
    }

    #[tokio::test]
    async fn recv_waits_for_delivery_and_ends_on_close() {
        let conn = Arc::new(live(4, OverflowPolicy::DropOldest));

        let reader = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(event) = conn.recv().await {
                    seen.push(event.x);
                    if seen.len() == 2 {
                        break;
                    }
                }
                let tail = conn.recv().await;
                (seen, tail)
            })
        };

        tokio::task::yield_now().await;
        conn.deliver(&event(10));
        conn.deliver(&event(11));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        conn.close(CloseReason::ClientGone);

        let (seen, tail) = reader.await.expect("reader task");
        assert_eq!(seen, vec![10, 11]);
        assert_eq!(tail, None);
    }
}
