//! Game room: owns one matched pair for the lifetime of a match

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::net::protocol::{Message, MessageKind, PlayerPositionData};
use crate::net::session::Session;
use crate::store::GameStore;

use super::map::{MapConfig, ObstacleMap};

/// Pause between `MatchFound` and `GameStart`, so clients can switch scenes
const MATCH_FOUND_LEAD: Duration = Duration::from_millis(500);

/// Room lifecycle. `Ending` only exists inside the death transition; the
/// observable states are `Created`, `Active` and `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Created,
    Starting,
    Active,
    Ending,
    Closed,
}

struct RoomInner {
    phase: RoomPhase,
    started_at: Option<Instant>,
    /// Last score each side reported through position updates. The winner's
    /// entry is what goes into the game record; the loser's is replaced by
    /// the score in their death report.
    last_scores: [Option<i64>; 2],
}

/// One active match between exactly two sessions
///
/// The inner mutex serializes every room operation, so `report_death` and
/// `player_disconnected` racing each other resolve to exactly one terminal
/// transition; whichever loses the race sees a closed room and does nothing.
pub struct GameRoom {
    pub id: Uuid,
    players: [Arc<Session>; 2],
    rooms: Arc<RoomRegistry>,
    store: Arc<dyn GameStore>,
    inner: Mutex<RoomInner>,
}

impl GameRoom {
    pub fn new(
        players: [Arc<Session>; 2],
        rooms: Arc<RoomRegistry>,
        store: Arc<dyn GameStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            players,
            rooms,
            store,
            inner: Mutex::new(RoomInner {
                phase: RoomPhase::Created,
                started_at: None,
                last_scores: [None, None],
            }),
        })
    }

    fn index_of(&self, session_id: Uuid) -> Option<usize> {
        self.players.iter().position(|p| p.id == session_id)
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.phase == RoomPhase::Closed
    }

    /// Announce the match, generate the shared map, and go live.
    ///
    /// The lock is held across the whole sequence, including the lead-in
    /// sleep; a disconnect arriving meanwhile waits and then sees `Active`.
    pub async fn start(&self) {
        let mut inner = self.inner.lock().await;
        if inner.phase != RoomPhase::Created {
            return;
        }
        inner.phase = RoomPhase::Starting;

        for player in &self.players {
            player
                .send(Message::new(MessageKind::MatchFound, "Opponent found!"))
                .await;
        }

        tokio::time::sleep(MATCH_FOUND_LEAD).await;

        let seed = rand::random::<u64>();
        let map = ObstacleMap::generate(&MapConfig::default(), seed);
        let map_payload = map.serialize();

        info!(
            room_id = %self.id,
            seed,
            "Match starting: {} vs {}",
            self.player_name(0),
            self.player_name(1),
        );

        // Both sides get the one serialized payload, byte for byte.
        for player in &self.players {
            player
                .send(Message::new(MessageKind::GameStart, map_payload.clone()))
                .await;
        }

        inner.started_at = Some(Instant::now());
        inner.phase = RoomPhase::Active;
    }

    /// Forward a position payload to the opponent, verbatim.
    ///
    /// Payloads are trusted as reported; the only server-side look at the
    /// contents is to remember the sender's running score.
    pub async fn relay_position(&self, from: Uuid, payload: &str) {
        let mut inner = self.inner.lock().await;
        if inner.phase != RoomPhase::Active {
            return;
        }
        let Some(sender) = self.index_of(from) else { return };

        match PlayerPositionData::parse(payload) {
            Ok(position) => inner.last_scores[sender] = Some(position.score),
            Err(e) => debug!(room_id = %self.id, error = %e, "Untracked position payload"),
        }

        self.players[1 - sender]
            .send(Message::new(MessageKind::OpponentPosition, payload))
            .await;
    }

    /// Handle a death report: the opponent wins, the result is recorded once,
    /// and the room closes.
    pub async fn report_death(&self, from: Uuid, payload: &str) {
        let mut inner = self.inner.lock().await;
        if inner.phase != RoomPhase::Active {
            return;
        }
        let Some(loser) = self.index_of(from) else { return };

        let loser_score: i64 = match payload.trim().parse() {
            Ok(score) => score,
            Err(_) => {
                warn!(room_id = %self.id, payload, "Unparseable death score, frame dropped");
                return;
            }
        };
        inner.phase = RoomPhase::Ending;

        let winner = 1 - loser;
        self.players[winner]
            .send(Message::new(MessageKind::OpponentDied, payload))
            .await;

        let duration_secs = inner
            .started_at
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0);

        let mut scores = inner.last_scores;
        scores[loser] = Some(loser_score);
        let final_scores = [scores[0].unwrap_or(0), scores[1].unwrap_or(0)];

        info!(
            room_id = %self.id,
            duration_secs,
            "Match over: {}({}) vs {}({})",
            self.player_name(0),
            final_scores[0],
            self.player_name(1),
            final_scores[1],
        );

        match (self.players[0].player(), self.players[1].player()) {
            (Some(p1), Some(p2)) => {
                // A failed write is logged and swallowed; both clients already
                // have their end-of-match messages.
                if let Err(e) = self
                    .store
                    .save_game_result(
                        p1.player_id,
                        p2.player_id,
                        final_scores[0],
                        final_scores[1],
                        duration_secs,
                    )
                    .await
                {
                    error!(room_id = %self.id, error = %e, "Failed to record game result");
                }
            }
            _ => error!(room_id = %self.id, "Room player without identity, result not recorded"),
        }

        inner.phase = RoomPhase::Closed;
        self.finalize();
    }

    /// Handle one side's connection going away. The survivor is told; no
    /// record is written for an abandoned match.
    pub async fn player_disconnected(&self, from: Uuid) {
        let mut inner = self.inner.lock().await;
        match inner.phase {
            RoomPhase::Created | RoomPhase::Starting | RoomPhase::Active => {
                inner.phase = RoomPhase::Closed;
                if let Some(sender) = self.index_of(from) {
                    self.players[1 - sender]
                        .send(Message::new(
                            MessageKind::ConnectionError,
                            "Opponent disconnected.",
                        ))
                        .await;
                }
                info!(room_id = %self.id, "Match abandoned, opponent notified");
                self.finalize();
            }
            // The death path is already driving the room down.
            RoomPhase::Ending | RoomPhase::Closed => {}
        }
    }

    /// Tear down a room whose pairing never completed. No notifications; the
    /// matchmaker re-queues whoever is still connected.
    pub async fn abort(&self) {
        let mut inner = self.inner.lock().await;
        if inner.phase == RoomPhase::Created {
            inner.phase = RoomPhase::Closed;
            self.finalize();
        }
    }

    /// Release both sessions and drop the room from the registry. Callers
    /// hold the inner lock and have just made the terminal transition, so
    /// this runs exactly once per room.
    fn finalize(&self) {
        for player in &self.players {
            player.detach_room(self.id);
        }
        self.rooms.remove(self.id);
    }

    fn player_name(&self, index: usize) -> String {
        self.players[index]
            .player()
            .map(|p| p.name)
            .unwrap_or_else(|| "?".to_string())
    }
}

/// Live rooms, keyed by room id
pub struct RoomRegistry {
    rooms: DashMap<Uuid, Arc<GameRoom>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn insert(&self, room: Arc<GameRoom>) {
        self.rooms.insert(room.id, room);
    }

    pub fn remove(&self, room_id: Uuid) {
        if self.rooms.remove(&room_id).is_some() {
            info!(room_id = %room_id, live_rooms = self.rooms.len(), "Room closed");
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
