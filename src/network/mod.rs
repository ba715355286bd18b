//! Network Layer
//!
//! WebSocket server and update fan-out for game synchronization.
//! This layer is **non-deterministic** - all game logic lives in `game/`.

pub mod broadcaster;
pub mod protocol;
pub mod server;

pub use broadcaster::{UpdateBroadcaster, UPDATE_CHANNEL};
pub use protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
pub use server::{GameServer, GameServerError, ServerConfig};
