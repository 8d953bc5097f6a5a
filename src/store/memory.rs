//! In-memory store with optional JSON snapshot persistence

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::{GameRecord, GameStore, PlayerId, PlayerStats, StoreError};

/// Serialized shape of the snapshot file
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    players: Vec<PlayerStats>,
    games: Vec<GameRecord>,
}

#[derive(Debug, Default)]
struct Inner {
    players: HashMap<PlayerId, PlayerStats>,
    /// Nickname -> player record, the uniqueness index
    names: HashMap<String, PlayerId>,
    games: Vec<GameRecord>,
}

impl Inner {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut inner = Self {
            games: snapshot.games,
            ..Self::default()
        };
        for stats in snapshot.players {
            inner.names.insert(stats.name.clone(), stats.player_id);
            inner.players.insert(stats.player_id, stats);
        }
        inner
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            players: self.players.values().cloned().collect(),
            games: self.games.clone(),
        }
    }
}

/// In-process [`GameStore`]
///
/// All state lives behind one `RwLock`; when a snapshot path is configured,
/// every mutation rewrites the file so stats survive a restart.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            snapshot_path: None,
        }
    }

    /// Open a store backed by a snapshot file, loading it if present
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let inner = match std::fs::read(&path) {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                info!(
                    path = %path.display(),
                    players = snapshot.players.len(),
                    games = snapshot.games.len(),
                    "Loaded store snapshot"
                );
                Inner::from_snapshot(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Inner::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
            snapshot_path: Some(path),
        })
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let bytes = {
            let inner = self.inner.read();
            serde_json::to_vec_pretty(&inner.to_snapshot())?
        };
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn upsert_player(&self, name: &str) -> Result<PlayerId, StoreError> {
        let player_id = {
            let mut inner = self.inner.write();
            if let Some(id) = inner.names.get(name) {
                return Ok(*id);
            }
            let id = Uuid::new_v4();
            inner.names.insert(name.to_string(), id);
            inner.players.insert(id, PlayerStats::new(id, name));
            id
        };
        self.persist().await?;
        Ok(player_id)
    }

    async fn save_game_result(
        &self,
        player1: PlayerId,
        player2: PlayerId,
        player1_score: i64,
        player2_score: i64,
        duration_secs: u64,
    ) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.write();

            let player1_name = inner
                .players
                .get(&player1)
                .map(|p| p.name.clone())
                .ok_or(StoreError::UnknownPlayer(player1))?;
            let player2_name = inner
                .players
                .get(&player2)
                .map(|p| p.name.clone())
                .ok_or(StoreError::UnknownPlayer(player2))?;

            let winner = if player1_score > player2_score {
                player1
            } else {
                player2
            };

            inner.games.push(GameRecord {
                player1,
                player2,
                player1_name,
                player2_name,
                player1_score,
                player2_score,
                winner,
                duration_secs,
                played_at: Utc::now(),
            });

            for (id, score) in [(player1, player1_score), (player2, player2_score)] {
                // Looked up above, still present under the same write lock.
                let stats = inner.players.get_mut(&id).ok_or(StoreError::UnknownPlayer(id))?;
                stats.total_games += 1;
                if id == winner {
                    stats.wins += 1;
                } else {
                    stats.losses += 1;
                }
                stats.highest_score = stats.highest_score.max(score);
            }
        }

        if let Err(e) = self.persist().await {
            // The record is in memory either way; losing the snapshot write
            // must not fail the match flow.
            warn!(error = %e, "Failed to persist store snapshot");
        }
        Ok(())
    }

    async fn get_stats(&self, name: &str) -> Result<Option<PlayerStats>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .names
            .get(name)
            .and_then(|id| inner.players.get(id))
            .cloned())
    }

    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<PlayerStats>, StoreError> {
        let inner = self.inner.read();
        let mut players: Vec<PlayerStats> = inner
            .players
            .values()
            .filter(|p| p.total_games > 0)
            .cloned()
            .collect();
        players.sort_by(|a, b| {
            b.wins
                .cmp(&a.wins)
                .then(b.highest_score.cmp(&a.highest_score))
        });
        players.truncate(limit);
        Ok(players)
    }

    async fn recent_games(
        &self,
        player: PlayerId,
        limit: usize,
    ) -> Result<Vec<GameRecord>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .games
            .iter()
            .rev()
            .filter(|g| g.player1 == player || g.player2 == player)
            .take(limit)
            .cloned()
            .collect())
    }
}
