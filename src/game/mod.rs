//! Game Logic Module
//!
//! All puzzle simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `state`: Board, tiles, per-game state
//! - `engine`: Directional move transitions (compaction + merges)
//! - `status`: Terminal-state evaluation (ongoing/won/lost)
//! - `spawn`: Random tile allocation after a settled move
//! - `round`: Full round driver (move -> spawn -> evaluate)

pub mod engine;
pub mod round;
pub mod spawn;
pub mod state;
pub mod status;

// Re-export key types
pub use engine::{apply_move, Direction, MoveOutcome};
pub use round::{advance, new_game, RoundOutcome};
pub use spawn::TileAllocator;
pub use state::{Board, Coord, GameId, GameState, GameStatus, StateError, Tile, TileId, TileMap};
pub use status::evaluate;
