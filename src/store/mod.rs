//! Durable player / game-record storage
//!
//! The server only ever talks to [`GameStore`]; the backend behind it is an
//! implementation detail. The in-tree [`MemoryStore`] keeps everything in
//! process with an optional JSON snapshot file for durability.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a player record
pub type PlayerId = Uuid;

/// Aggregate win/loss/score history for one player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStats {
    pub player_id: PlayerId,
    pub name: String,
    pub total_games: u32,
    pub wins: u32,
    pub losses: u32,
    pub highest_score: i64,
}

impl PlayerStats {
    fn new(player_id: PlayerId, name: &str) -> Self {
        Self {
            player_id,
            name: name.to_string(),
            total_games: 0,
            wins: 0,
            losses: 0,
            highest_score: 0,
        }
    }

    /// Win rate in percent
    pub fn win_rate(&self) -> f64 {
        if self.total_games == 0 {
            return 0.0;
        }
        f64::from(self.wins) / f64::from(self.total_games) * 100.0
    }
}

impl std::fmt::Display for PlayerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {}W {}L ({:.1}%) | best: {}",
            self.name,
            self.wins,
            self.losses,
            self.win_rate(),
            self.highest_score
        )
    }
}

/// One finished match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub player1: PlayerId,
    pub player2: PlayerId,
    pub player1_name: String,
    pub player2_name: String,
    pub player1_score: i64,
    pub player2_score: i64,
    pub winner: PlayerId,
    pub duration_secs: u64,
    pub played_at: DateTime<Utc>,
}

impl std::fmt::Display for GameRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let winner_name = if self.winner == self.player1 {
            &self.player1_name
        } else {
            &self.player2_name
        };
        write!(
            f,
            "[{}] {}({}) vs {}({}) - winner: {}",
            self.played_at.format("%Y-%m-%d %H:%M"),
            self.player1_name,
            self.player1_score,
            self.player2_name,
            self.player2_score,
            winner_name
        )
    }
}

/// Store failures. Reads surface to the admin console; write failures are
/// logged by callers and never abort the match flow.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown player: {0}")]
    UnknownPlayer(PlayerId),

    #[error("snapshot I/O failed: {0}")]
    SnapshotIo(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    SnapshotFormat(#[from] serde_json::Error),
}

/// Abstract persistence port
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Resolve a nickname to its player record, creating one if needed
    async fn upsert_player(&self, name: &str) -> Result<PlayerId, StoreError>;

    /// Record one finished match and update both players' aggregates.
    /// The winner is whichever side scored higher.
    async fn save_game_result(
        &self,
        player1: PlayerId,
        player2: PlayerId,
        player1_score: i64,
        player2_score: i64,
        duration_secs: u64,
    ) -> Result<(), StoreError>;

    async fn get_stats(&self, name: &str) -> Result<Option<PlayerStats>, StoreError>;

    /// Top players ordered by wins, then highest score
    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<PlayerStats>, StoreError>;

    /// Most recent matches involving a player, newest first
    async fn recent_games(
        &self,
        player: PlayerId,
        limit: usize,
    ) -> Result<Vec<GameRecord>, StoreError>;
}
