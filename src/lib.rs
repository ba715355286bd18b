//! # Gridmerge Game Server
//!
//! Synchronized sliding-tile merge puzzle (4x4 grid, power-of-two tiles,
//! goal tile 2048) with a persistent session store and multi-observer sync.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    GRIDMERGE SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/              - Deterministic primitives               │
//! │  └── rng.rs         - Deterministic Xorshift128+ PRNG        │
//! │                                                              │
//! │  game/              - Game logic (deterministic)             │
//! │  ├── state.rs       - Board, tiles, game state               │
//! │  ├── engine.rs      - Directional move transitions           │
//! │  ├── status.rs      - Won/lost/ongoing evaluation            │
//! │  ├── spawn.rs       - Random tile allocation                 │
//! │  └── round.rs       - Move settling (move -> spawn -> eval)  │
//! │                                                              │
//! │  store/             - Persistence (async)                    │
//! │  ├── backend.rs     - Key-value + pub/sub abstraction        │
//! │  └── games.rs       - Canonical per-game session store       │
//! │                                                              │
//! │  network/           - Networking (non-deterministic)         │
//! │  ├── protocol.rs    - Message types                          │
//! │  ├── broadcaster.rs - Update fan-out to observers            │
//! │  └── server.rs      - WebSocket server                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are **100% deterministic**:
//! - Exact integer arithmetic only, no floating point
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from seeded Xorshift128+
//!
//! Given identical inputs and RNG seed, a game produces **identical
//! boards, scores, and spawns** on any platform.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use crate::core::rng::DeterministicRng;
pub use crate::game::engine::{apply_move, Direction, MoveOutcome};
pub use crate::game::spawn::TileAllocator;
pub use crate::game::state::{Board, Coord, GameId, GameState, GameStatus, Tile, TileId};
pub use crate::store::games::GameStore;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tiles per board dimension (the board is BOARD_SIZE x BOARD_SIZE).
pub const BOARD_SIZE: usize = 4;

/// Value of freshly spawned tiles.
pub const SPAWN_TILE_VALUE: u32 = 2;

/// Tile value that wins the game.
pub const WIN_TILE_VALUE: u32 = 2048;
