//! Round Settling
//!
//! Drives one full game round: move transition, tile spawn, terminal
//! evaluation. `ongoing --move(changed)--> settling --spawn--> evaluate`.
//!
//! The whole round is synchronous, so a move fully settles before the
//! caller can submit the next input; there is nowhere for excess inputs
//! to queue.

use crate::game::engine::{apply_move, Direction};
use crate::game::spawn::TileAllocator;
use crate::game::state::{GameId, GameState, GameStatus, TileId};
use crate::game::status::evaluate;
use crate::WIN_TILE_VALUE;

/// What one call to [`advance`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Whether the move changed the board. False for wall moves and for
    /// moves submitted after the game ended.
    pub changed: bool,
    /// Points earned by this round's merges.
    pub score_delta: u64,
    /// Id of the tile spawned after settling, if any.
    pub spawned: Option<TileId>,
    /// Status after the round.
    pub status: GameStatus,
}

impl RoundOutcome {
    fn unchanged(status: GameStatus) -> Self {
        Self {
            changed: false,
            score_delta: 0,
            spawned: None,
            status,
        }
    }
}

/// Create a fresh game: empty board seeded with two value-2 tiles at
/// distinct random empty cells.
pub fn new_game(id: GameId, allocator: &mut TileAllocator) -> GameState {
    let mut state = GameState::empty(id);
    for _ in 0..2 {
        if let Some(tile) = allocator.spawn(&state.board) {
            state.insert_tile(tile);
        }
    }
    state
}

/// Apply one directional input and settle the round.
///
/// Moves on a terminal game are ignored: the state is left untouched and
/// the outcome reports `changed == false`. A move that does not change the
/// board spawns nothing and leaves the status alone. Otherwise exactly one
/// tile is spawned (unless the board is full) and the status is
/// re-evaluated against [`WIN_TILE_VALUE`].
pub fn advance(
    state: &mut GameState,
    direction: Direction,
    allocator: &mut TileAllocator,
) -> RoundOutcome {
    if state.status.is_terminal() {
        return RoundOutcome::unchanged(state.status);
    }

    let outcome = apply_move(&state.board, &state.tiles, direction);
    if !outcome.changed {
        return RoundOutcome::unchanged(state.status);
    }

    state.board = outcome.board;
    state.tiles = outcome.tiles;
    state.score += outcome.score_delta;
    state.has_changed = true;
    state.compact_order();

    let spawned = allocator.spawn(&state.board).map(|tile| {
        let id = tile.id;
        state.insert_tile(tile);
        id
    });

    state.status = evaluate(&state.board, &state.tiles, WIN_TILE_VALUE);
    state.has_changed = false;

    RoundOutcome {
        changed: true,
        score_delta: outcome.score_delta,
        spawned,
        status: state.status,
    }
}

// =============================================================================
// TESTS
// =============================================================================
