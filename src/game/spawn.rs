//! Tile Allocation
//!
//! Chooses an empty cell and spawns a new low-value tile after a settled
//! move. The randomness source is injected so tests can pin the sequence.

use crate::core::rng::{derive_game_seed, DeterministicRng};
use crate::game::state::{Board, GameId, Tile, TileId};
use crate::SPAWN_TILE_VALUE;

/// Spawns value-2 tiles at uniformly random empty cells.
///
/// Exactly one tile is spawned per settled move (not per merge). Identifier
/// material and cell choice both come from the owned [`DeterministicRng`],
/// so a given seed reproduces the same spawn sequence.
#[derive(Clone, Debug)]
pub struct TileAllocator {
    rng: DeterministicRng,
}

impl TileAllocator {
    /// Create an allocator from an explicit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: DeterministicRng::new(seed),
        }
    }

    /// Create an allocator seeded from a game identifier.
    pub fn for_game(game_id: &GameId) -> Self {
        Self::new(derive_game_seed(game_id.as_bytes()))
    }

    /// Create an allocator around an existing RNG.
    pub fn with_rng(rng: DeterministicRng) -> Self {
        Self { rng }
    }

    /// Spawn one tile at a random empty cell, or `None` if the board is full.
    ///
    /// The caller should already have detected loss before asking for a
    /// spawn on a full board.
    pub fn spawn(&mut self, board: &Board) -> Option<Tile> {
        let empty = board.empty_cells();
        if empty.is_empty() {
            return None;
        }

        let position = empty[self.rng.next_int(empty.len() as u32) as usize];
        let id = TileId::from_rng_bytes(self.rng.next_bytes16());

        Some(Tile::new(id, position, SPAWN_TILE_VALUE))
    }
}

// =============================================================================
// TESTS
// =============================================================================
