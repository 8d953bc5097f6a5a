//! FIFO waiting queue

use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

use crate::net::session::Session;

/// The waiting queue: strictly first-come, first-served. No priorities, no
/// skill ordering. Callers serialize access (see the matchmaking service).
#[derive(Default)]
pub struct WaitQueue {
    queue: VecDeque<Arc<Session>>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Append a session; false if it is already waiting
    pub fn enqueue(&mut self, session: Arc<Session>) -> bool {
        if self.contains(session.id) {
            return false;
        }
        self.queue.push_back(session);
        true
    }

    /// Remove a session; no-op when absent
    pub fn dequeue(&mut self, session_id: Uuid) -> Option<Arc<Session>> {
        let pos = self.queue.iter().position(|s| s.id == session_id)?;
        self.queue.remove(pos)
    }

    pub fn contains(&self, session_id: Uuid) -> bool {
        self.queue.iter().any(|s| s.id == session_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Atomically remove and return the two oldest waiting sessions, or
    /// nothing when fewer than two are waiting.
    ///
    /// Disconnect dequeues synchronously, but a session can still die between
    /// that check and the pop; entries whose connection ended are discarded
    /// here rather than matched against a ghost.
    pub fn try_match(&mut self) -> Option<(Arc<Session>, Arc<Session>)> {
        self.queue.retain(|s| !s.is_ended());
        if self.queue.len() < 2 {
            return None;
        }
        let first = self.queue.pop_front()?;
        let second = self.queue.pop_front()?;
        Some((first, second))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn session() -> Arc<Session> {
        // Queue bookkeeping never touches the outbox.
        let (tx, _rx) = mpsc::channel(8);
        Session::new(tx)
    }

    #[test]
    fn matches_in_strict_arrival_order() {
        let mut queue = WaitQueue::new();
        let (a, b, c, d) = (session(), session(), session(), session());
        for s in [&a, &b, &c, &d] {
            assert!(queue.enqueue(s.clone()));
        }

        let (first, second) = queue.try_match().unwrap();
        assert_eq!((first.id, second.id), (a.id, b.id));

        let (third, fourth) = queue.try_match().unwrap();
        assert_eq!((third.id, fourth.id), (c.id, d.id));

        assert!(queue.try_match().is_none());
    }

    #[test]
    fn enqueue_is_idempotent_by_identity() {
        let mut queue = WaitQueue::new();
        let a = session();
        assert!(queue.enqueue(a.clone()));
        assert!(!queue.enqueue(a.clone()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn dequeue_missing_is_a_no_op() {
        let mut queue = WaitQueue::new();
        let a = session();
        queue.enqueue(a.clone());
        assert!(queue.dequeue(Uuid::new_v4()).is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.dequeue(a.id).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn one_waiting_session_never_matches() {
        let mut queue = WaitQueue::new();
        queue.enqueue(session());
        assert!(queue.try_match().is_none());
        assert_eq!(queue.len(), 1);
    }
}
