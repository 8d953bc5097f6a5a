//! Matchmaking service - owns the queue and drives pairing

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::{GameRoom, RoomRegistry};
use crate::net::protocol::{Message, MessageKind};
use crate::net::session::Session;
use crate::store::GameStore;

use super::queue::WaitQueue;

/// Pairs waiting sessions into rooms
///
/// The queue mutex is the single piece of state shared between every
/// connection task and the matching loop; everything it guards is quick and
/// never blocks on I/O.
pub struct MatchmakingService {
    queue: Mutex<WaitQueue>,
    rooms: Arc<RoomRegistry>,
    store: Arc<dyn GameStore>,
    tick: Duration,
}

impl MatchmakingService {
    pub fn new(rooms: Arc<RoomRegistry>, store: Arc<dyn GameStore>, tick_ms: u64) -> Self {
        Self {
            queue: Mutex::new(WaitQueue::new()),
            rooms,
            store,
            tick: Duration::from_millis(tick_ms),
        }
    }

    /// Add a session to the queue and acknowledge it. No-op for a session
    /// already waiting, not yet named, or currently in a room.
    pub async fn enqueue(self: &Arc<Self>, session: &Arc<Session>) {
        let queue_len = {
            let mut queue = self.queue.lock().await;
            if queue.contains(session.id) {
                return;
            }
            if !session.mark_queued() {
                debug!(session_id = %session.id, "Session not eligible for the queue");
                return;
            }
            queue.enqueue(session.clone());
            queue.len()
        };

        info!(session_id = %session.id, queue_len, "Session waiting for a match");
        session
            .send(Message::new(
                MessageKind::WaitingForMatch,
                "Searching for an opponent...",
            ))
            .await;
    }

    /// Drop a session from the queue; no-op when absent
    pub async fn remove(&self, session_id: Uuid) {
        self.queue.lock().await.dequeue(session_id);
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Matching loop: periodically pair the two oldest waiting sessions.
    /// Room setup runs on its own task so one room's I/O never delays the
    /// next pair.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.tick);
        loop {
            interval.tick().await;
            loop {
                let pair = self.queue.lock().await.try_match();
                let Some((first, second)) = pair else { break };

                let service = self.clone();
                tokio::spawn(async move {
                    service.launch_match(first, second).await;
                });
            }
        }
    }

    async fn launch_match(self: Arc<Self>, first: Arc<Session>, second: Arc<Session>) {
        let room = GameRoom::new(
            [first.clone(), second.clone()],
            self.rooms.clone(),
            self.store.clone(),
        );
        self.rooms.insert(room.clone());

        let first_ok = first.attach_room(&room);
        let second_ok = second.attach_room(&room);
        if !(first_ok && second_ok) {
            // One side vanished between the pop and the attach. Tear the room
            // down and let the survivor wait again.
            debug!(room_id = %room.id, "Pairing raced a disconnect, aborting room");
            room.abort().await;
            for session in [first, second] {
                if !session.is_ended() {
                    self.enqueue(&session).await;
                }
            }
            return;
        }

        room.start().await;
    }
}
