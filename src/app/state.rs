//! Application state shared across connection tasks

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::game::RoomRegistry;
use crate::matchmaking::MatchmakingService;
use crate::store::{GameStore, MemoryStore, StoreError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn GameStore>,
    pub matchmaking: Arc<MatchmakingService>,
    pub rooms: Arc<RoomRegistry>,
    pub names: Arc<NicknameRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, StoreError> {
        let config = Arc::new(config);

        // Initialize the store, loading the snapshot if one is configured
        let store: Arc<dyn GameStore> = match &config.store_snapshot {
            Some(path) => Arc::new(MemoryStore::open(path.clone())?),
            None => Arc::new(MemoryStore::new()),
        };

        // Initialize the room registry
        let rooms = Arc::new(RoomRegistry::new());

        // Initialize the matchmaking service
        let matchmaking = Arc::new(MatchmakingService::new(
            rooms.clone(),
            store.clone(),
            config.match_tick_ms,
        ));

        Ok(Self {
            config,
            store,
            matchmaking,
            rooms,
            names: Arc::new(NicknameRegistry::new()),
        })
    }
}

/// Nicknames currently claimed by live sessions
///
/// This is the uniqueness check for connected players; historical names live
/// in the store and are resolved, not rejected.
pub struct NicknameRegistry {
    claims: DashMap<String, Uuid>,
}

impl NicknameRegistry {
    pub fn new() -> Self {
        Self {
            claims: DashMap::new(),
        }
    }

    /// Claim a name for a session. False when another live session holds it;
    /// re-claiming one's own name is allowed.
    pub fn claim(&self, name: &str, session_id: Uuid) -> bool {
        let entry = self.claims.entry(name.to_string()).or_insert(session_id);
        *entry.value() == session_id
    }

    /// Release a claim. Only the holder can release; a stale release after
    /// the name moved on is a no-op.
    pub fn release(&self, name: &str, session_id: Uuid) {
        self.claims.remove_if(name, |_, holder| *holder == session_id);
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }
}

impl Default for NicknameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_session_cannot_claim_a_held_name() {
        let names = NicknameRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(names.claim("Rex", first));
        assert!(names.claim("Rex", first)); // own claim is stable
        assert!(!names.claim("Rex", second));

        names.release("Rex", first);
        assert!(names.claim("Rex", second));
    }

    #[test]
    fn stale_release_does_not_free_a_moved_name() {
        let names = NicknameRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(names.claim("Rex", first));
        names.release("Rex", first);
        assert!(names.claim("Rex", second));

        // First session's late release must not unseat the new holder.
        names.release("Rex", first);
        assert!(!names.claim("Rex", first));
        assert_eq!(names.len(), 1);
    }
}
