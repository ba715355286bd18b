//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON; the closed enums give exhaustive
//! compile-time handling instead of string-keyed dispatch.

use serde::{Deserialize, Serialize};

use crate::game::state::{GameId, GameState};
use crate::store::games::StoreError;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Persist a new game and return its identifier.
    CreateGame {
        /// Initial state; its id is replaced by the store.
        state: GameState,
    },

    /// Fetch the authoritative state for a game.
    ReadGame {
        /// Game identifier as a UUID string.
        id: String,
    },

    /// Enumerate all stored games.
    ListGames,

    /// Overwrite the authoritative state (last-write-wins).
    UpdateGame {
        /// The client's settled state.
        state: GameState,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Acknowledges `CreateGame` with the assigned identifier.
    GameCreated {
        /// Identifier of the persisted game.
        id: String,
    },

    /// Response to `ReadGame`.
    Game {
        /// The stored, validated state.
        state: GameState,
    },

    /// Response to `ListGames`.
    GameList {
        /// All records that deserialized and validated.
        games: Vec<GameState>,
        /// Corrupt records skipped during the listing.
        skipped: usize,
    },

    /// Acknowledges `UpdateGame`; until this (or a reconciling
    /// `GameUpdated`) arrives, the client's state is speculative.
    UpdateAck {
        /// Identifier that was written.
        id: String,
    },

    /// Push notification: another observer updated this game.
    GameUpdated {
        /// Identifier of the updated game.
        id: String,
        /// Authoritative post-write state; replaces the local copy.
        state: GameState,
    },

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall-clock millis.
        server_time: u64,
    },

    /// Request failed; the operation was not applied.
    Error(ServerError),
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Server error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed identifier or state shape; rejected before any mutation.
    InvalidPayload,
    /// No game under that identifier.
    NotFound,
    /// Stored record exists but is corrupt.
    ParseFailed,
    /// Persistence or pub/sub backend unreachable; retryable.
    BackendUnavailable,
    /// Anything else.
    InternalError,
}

impl ServerError {
    /// Build the wire error for a store failure.
    pub fn from_store(err: &StoreError) -> Self {
        let code = match err {
            StoreError::Validation(_) => ErrorCode::InvalidPayload,
            StoreError::NotFound(_) => ErrorCode::NotFound,
            StoreError::Parse { .. } => ErrorCode::ParseFailed,
            StoreError::Backend(_) => ErrorCode::BackendUnavailable,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }

    /// Error for an unparseable identifier.
    pub fn malformed_id(raw: &str) -> Self {
        Self {
            code: ErrorCode::InvalidPayload,
            message: format!("malformed game id: {raw}"),
        }
    }
}

/// Parse a wire identifier, if well-formed.
pub fn parse_game_id(raw: &str) -> Option<GameId> {
    GameId::from_uuid_str(raw)
}

// =============================================================================
// TESTS
// =============================================================================
