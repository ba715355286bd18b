//! Game Session Store
//!
//! Single source of truth per game identifier. Bridges engine state to the
//! key-value backend: serialize on write, deserialize and schema-validate on
//! every read. Writes are unconditional overwrites (last-write-wins); no
//! version check happens at this layer.

use std::sync::Arc;

use tracing::warn;

use crate::game::state::{GameId, GameState};
use crate::store::backend::{BackendError, KvBackend};

/// Key namespace for persisted game records.
pub const GAME_KEY_PREFIX: &str = "game:";

/// Store failure taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// State shape rejected before any mutation.
    #[error("invalid game state: {0}")]
    Validation(String),

    /// No record under the identifier.
    #[error("game {0} not found")]
    NotFound(GameId),

    /// A record exists but fails schema validation. Distinct from
    /// [`StoreError::NotFound`]; indicates corruption upstream.
    #[error("corrupt record at {key}: {reason}")]
    Parse {
        /// Backend key of the corrupt record.
        key: String,
        /// What failed to parse or validate.
        reason: String,
    },

    /// The backend could not serve the call. Retryable.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StoreError {
    /// Whether the caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

/// Result of [`GameStore::list`].
#[derive(Debug)]
pub struct GameListing {
    /// All records that deserialized and validated.
    pub games: Vec<GameState>,
    /// Count of corrupt or vanished records that were skipped.
    pub skipped: usize,
}

/// Canonical store for game states, keyed `game:<uuid>`.
pub struct GameStore {
    backend: Arc<dyn KvBackend>,
}

impl GameStore {
    /// Create a store over a backend.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    fn key(id: &GameId) -> String {
        format!("{GAME_KEY_PREFIX}{id}")
    }

    /// Persist a new game under a freshly generated identifier.
    ///
    /// The identifier on the incoming state is replaced; the UUIDv4 space
    /// makes collisions with existing records negligible.
    pub async fn create(&self, mut state: GameState) -> Result<GameId, StoreError> {
        state.id = GameId::random();
        self.put(&state).await
    }

    /// Read and validate the record for `id`.
    pub async fn read(&self, id: &GameId) -> Result<GameState, StoreError> {
        let key = Self::key(id);
        let json = self
            .backend
            .get(&key)
            .await?
            .ok_or(StoreError::NotFound(*id))?;
        parse_record(&key, &json)
    }

    /// Overwrite the record for `state.id` unconditionally.
    ///
    /// Last-write-wins: a temporally later write for the same identifier
    /// discards this one's effect without telling anybody. Returns the
    /// identifier written as the acknowledgement.
    pub async fn write(&self, state: &GameState) -> Result<GameId, StoreError> {
        self.put(state).await
    }

    /// Enumerate all persisted games.
    ///
    /// Individually corrupt records are skipped and counted rather than
    /// failing the whole listing.
    pub async fn list(&self) -> Result<GameListing, StoreError> {
        let keys = self.backend.keys(GAME_KEY_PREFIX).await?;
        let values = self.backend.mget(&keys).await?;

        let mut games = Vec::new();
        let mut skipped = 0;
        for (key, value) in keys.iter().zip(values) {
            match value {
                Some(json) => match parse_record(key, &json) {
                    Ok(state) => games.push(state),
                    Err(err) => {
                        skipped += 1;
                        warn!("Skipping corrupt game record {}: {}", key, err);
                    }
                },
                None => {
                    skipped += 1;
                    warn!("Game record {} vanished during listing", key);
                }
            }
        }

        Ok(GameListing { games, skipped })
    }

    async fn put(&self, state: &GameState) -> Result<GameId, StoreError> {
        state
            .validate()
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let json = serde_json::to_string(state)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        self.backend.set(&Self::key(&state.id), &json).await?;
        Ok(state.id)
    }
}

fn parse_record(key: &str, json: &str) -> Result<GameState, StoreError> {
    let state: GameState = serde_json::from_str(json).map_err(|e| StoreError::Parse {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    state.validate().map_err(|e| StoreError::Parse {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    Ok(state)
}

// =============================================================================
// TESTS
// =============================================================================
