//! Terminal-State Evaluation
//!
//! Classifies a board as ongoing, won, or lost. Win is checked before loss
//! because a winning move may simultaneously fill the board.

use crate::game::state::{Board, Coord, GameStatus, TileMap};
use crate::BOARD_SIZE;

/// Classify the board.
///
/// - `Won` as soon as any tile's value is at or above `win_value`.
/// - `Lost` when no cell is empty and no two axis-adjacent tiles share a
///   value, so no direction could change the board.
/// - `Ongoing` otherwise.
pub fn evaluate(board: &Board, tiles: &TileMap, win_value: u32) -> GameStatus {
    if tiles.values().any(|t| t.value >= win_value) {
        return GameStatus::Won;
    }

    let n = BOARD_SIZE as u8;
    for x in 0..n {
        for y in 0..n {
            let Some(id) = board.get(Coord::new(x, y)) else {
                return GameStatus::Ongoing;
            };
            let Some(value) = tiles.get(&id).map(|t| t.value) else {
                return GameStatus::Ongoing;
            };

            let right = (x + 1 < n).then(|| board.get(Coord::new(x + 1, y))).flatten();
            if right.and_then(|r| tiles.get(&r)).map(|t| t.value) == Some(value) {
                return GameStatus::Ongoing;
            }

            let down = (y + 1 < n).then(|| board.get(Coord::new(x, y + 1))).flatten();
            if down.and_then(|d| tiles.get(&d)).map(|t| t.value) == Some(value) {
                return GameStatus::Ongoing;
            }
        }
    }

    GameStatus::Lost
}

// =============================================================================
// TESTS
// =============================================================================
