//! Board Move Engine
//!
//! The deterministic transition from (board, direction) to the next board.
//! Pure function, no I/O, no allocation beyond the returned state.

use serde::{Deserialize, Serialize};

use crate::game::state::{Board, Coord, TileId, TileMap};
use crate::BOARD_SIZE;

/// One of the four move directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Tiles slide toward y = 0.
    Up,
    /// Tiles slide toward y = N-1.
    Down,
    /// Tiles slide toward x = 0.
    Left,
    /// Tiles slide toward x = N-1.
    Right,
}

impl Direction {
    /// All four directions, for exhaustive checks.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];
}

/// Result of applying a move to a board.
#[derive(Clone, Debug)]
pub struct MoveOutcome {
    /// Board after compaction and merges.
    pub board: Board,
    /// Tile map after the move; consumed tiles are removed.
    pub tiles: TileMap,
    /// Points earned: the sum of post-merge (doubled) values.
    pub score_delta: u64,
    /// True iff any tile moved or any merge occurred.
    pub changed: bool,
}

/// Map (lane, step) to a cell for a direction.
///
/// `step` counts from the edge tiles move toward, so step 0 is where the
/// lane's first tile comes to rest. Scanning in step order is what makes
/// tiles accumulate against the moving edge deterministically.
#[inline]
fn line_coord(direction: Direction, lane: u8, step: u8) -> Coord {
    let far = (BOARD_SIZE - 1) as u8;
    match direction {
        Direction::Up => Coord::new(lane, step),
        Direction::Down => Coord::new(lane, far - step),
        Direction::Left => Coord::new(step, lane),
        Direction::Right => Coord::new(far - step, lane),
    }
}

/// Apply one directional move.
///
/// Each of the N lines perpendicular to the direction is processed
/// independently, scanning from the moving edge:
///
/// 1. Empty cells are skipped.
/// 2. A tile equal in value to the pending tile merges into it: the pending
///    tile's value doubles, the consumed tile leaves the map, and the
///    pending slot is cleared so a third equal tile starts a new slot.
///    A tile therefore merges at most once per move.
/// 3. Any other tile is placed at the next compacted slot and becomes the
///    pending tile.
///
/// Tiles missing from the map are skipped rather than panicking; stored
/// states are validated before they get here.
pub fn apply_move(board: &Board, tiles: &TileMap, direction: Direction) -> MoveOutcome {
    let n = BOARD_SIZE as u8;
    let mut new_board = Board::empty();
    let mut new_tiles = tiles.clone();
    let mut score_delta: u64 = 0;
    let mut changed = false;

    for lane in 0..n {
        let mut slot: u8 = 0;
        let mut pending: Option<TileId> = None;

        for step in 0..n {
            let src = line_coord(direction, lane, step);
            let Some(id) = board.get(src) else { continue };
            let Some(value) = tiles.get(&id).map(|t| t.value) else {
                continue;
            };

            if let Some(pending_id) = pending {
                if new_tiles.get(&pending_id).map(|t| t.value) == Some(value) {
                    if let Some(merged) = new_tiles.get_mut(&pending_id) {
                        merged.value *= 2;
                        score_delta += u64::from(merged.value);
                    }
                    new_tiles.remove(&id);
                    pending = None;
                    changed = true;
                    continue;
                }
            }

            let dst = line_coord(direction, lane, slot);
            new_board.set(dst, id);
            if let Some(tile) = new_tiles.get_mut(&id) {
                if tile.position != dst {
                    changed = true;
                }
                tile.position = dst;
            }
            pending = Some(id);
            slot += 1;
        }
    }

    MoveOutcome {
        board: new_board,
        tiles: new_tiles,
        score_delta,
        changed,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Tile;
    use proptest::prelude::*;

    /// Build a board + tile map from a value grid; 0 means empty.
    fn board_from(values: [[u32; BOARD_SIZE]; BOARD_SIZE]) -> (Board, TileMap) {
        let mut board = Board::empty();
        let mut tiles = TileMap::new();
        for (y, row) in values.iter().enumerate() {
            for (x, &value) in row.iter().enumerate() {
                if value == 0 {
                    continue;
                }
                let id = TileId::from_rng_bytes([(y * BOARD_SIZE + x + 1) as u8; 16]);
                let at = Coord::new(x as u8, y as u8);
                board.set(at, id);
                tiles.insert(id, Tile::new(id, at, value));
            }
        }
        (board, tiles)
    }

    /// Read a board + tile map back into a value grid.
    fn values_of(board: &Board, tiles: &TileMap) -> [[u32; BOARD_SIZE]; BOARD_SIZE] {
        let mut values = [[0u32; BOARD_SIZE]; BOARD_SIZE];
        for (at, id) in board.occupied() {
            values[at.y as usize][at.x as usize] = tiles[&id].value;
        }
        values
    }

    #[test]
    fn test_left_merges_leading_pair() {
        let (board, tiles) = board_from([
            [2, 2, 0, 0],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
        ]);

        let outcome = apply_move(&board, &tiles, Direction::Left);

        assert_eq!(
            values_of(&outcome.board, &outcome.tiles)[0],
            [4, 0, 0, 0]
        );
        assert_eq!(outcome.score_delta, 4);
        assert!(outcome.changed);
        assert_eq!(outcome.tiles.len(), 1);
    }

    #[test]
    fn test_move_into_wall_is_noop() {
        let (board, tiles) = board_from([
            [2, 0, 0, 0],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
        ]);

        for direction in [Direction::Left, Direction::Up] {
            let outcome = apply_move(&board, &tiles, direction);
            assert!(!outcome.changed, "{direction:?} should not change");
            assert_eq!(outcome.score_delta, 0);
            assert_eq!(outcome.board, board);
        }
    }

    #[test]
    fn test_compaction_without_merge_counts_as_change() {
        let (board, tiles) = board_from([
            [0, 0, 0, 2],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
        ]);

        let outcome = apply_move(&board, &tiles, Direction::Left);

        assert!(outcome.changed);
        assert_eq!(outcome.score_delta, 0);
        assert_eq!(
            values_of(&outcome.board, &outcome.tiles)[0],
            [2, 0, 0, 0]
        );
    }

    #[test]
    fn test_four_equal_tiles_merge_pairwise() {
        let (board, tiles) = board_from([
            [2, 2, 2, 2],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
        ]);

        let outcome = apply_move(&board, &tiles, Direction::Left);

        assert_eq!(
            values_of(&outcome.board, &outcome.tiles)[0],
            [4, 4, 0, 0]
        );
        assert_eq!(outcome.score_delta, 8);
    }

    #[test]
    fn test_merge_at_most_once_per_move() {
        // Three equal tiles: the pair at the moving edge merges, the third
        // starts a new slot instead of triple-merging.
        let (board, tiles) = board_from([
            [2, 2, 2, 0],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
        ]);

        let outcome = apply_move(&board, &tiles, Direction::Left);

        assert_eq!(
            values_of(&outcome.board, &outcome.tiles)[0],
            [4, 2, 0, 0]
        );
        assert_eq!(outcome.score_delta, 4);
    }

    #[test]
    fn test_merged_pair_does_not_chain_into_neighbor() {
        // [4, 2, 2] left: the 2s merge into a 4 next to the original 4.
        // The fresh 4 must not merge again this move.
        let (board, tiles) = board_from([
            [4, 2, 2, 0],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
        ]);

        let outcome = apply_move(&board, &tiles, Direction::Left);

        assert_eq!(
            values_of(&outcome.board, &outcome.tiles)[0],
            [4, 4, 0, 0]
        );
        assert_eq!(outcome.score_delta, 4);
    }

    #[test]
    fn test_right_accumulates_against_right_edge() {
        let (board, tiles) = board_from([
            [0, 0, 2, 2],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
        ]);

        let outcome = apply_move(&board, &tiles, Direction::Right);

        assert_eq!(
            values_of(&outcome.board, &outcome.tiles)[0],
            [0, 0, 0, 4]
        );
        assert_eq!(outcome.score_delta, 4);
    }

    #[test]
    fn test_up_scans_top_to_bottom() {
        // Column [2, 2, 4]: the top pair merges, the 4 compacts below it.
        let (board, tiles) = board_from([
            [2, 0, 0, 0],
            [2, 0, 0, 0],
            [4, 0, 0, 0],
            [0, 0, 0, 0],
        ]);

        let outcome = apply_move(&board, &tiles, Direction::Up);

        let values = values_of(&outcome.board, &outcome.tiles);
        assert_eq!(values[0][0], 4);
        assert_eq!(values[1][0], 4);
        assert_eq!(values[2][0], 0);
        assert_eq!(outcome.score_delta, 4);
    }

    #[test]
    fn test_down_tie_break_merges_bottom_pair() {
        // Column [2, 2, 2] moving down: the pair nearest the bottom edge
        // merges, the remaining 2 sits above it.
        let (board, tiles) = board_from([
            [2, 0, 0, 0],
            [2, 0, 0, 0],
            [2, 0, 0, 0],
            [0, 0, 0, 0],
        ]);

        let outcome = apply_move(&board, &tiles, Direction::Down);

        let values = values_of(&outcome.board, &outcome.tiles);
        assert_eq!(values[3][0], 4);
        assert_eq!(values[2][0], 2);
        assert_eq!(values[1][0], 0);
        assert_eq!(outcome.score_delta, 4);
    }

    #[test]
    fn test_gridlocked_board_rejects_all_directions() {
        // Full board, no adjacent equal values anywhere.
        let (board, tiles) = board_from([
            [2, 4, 2, 4],
            [4, 2, 4, 2],
            [2, 4, 2, 4],
            [4, 2, 4, 2],
        ]);

        for direction in Direction::ALL {
            let outcome = apply_move(&board, &tiles, direction);
            assert!(!outcome.changed, "{direction:?} should report no change");
        }
    }

    #[test]
    fn test_lanes_are_independent() {
        let (board, tiles) = board_from([
            [2, 4, 0, 0],
            [2, 4, 0, 0],
            [0, 0, 0, 0],
            [0, 0, 0, 0],
        ]);

        let outcome = apply_move(&board, &tiles, Direction::Up);

        let values = values_of(&outcome.board, &outcome.tiles);
        assert_eq!(values[0], [4, 8, 0, 0]);
        assert_eq!(outcome.score_delta, 12);
    }

    fn arb_grid() -> impl Strategy<Value = [[u32; BOARD_SIZE]; BOARD_SIZE]> {
        prop::array::uniform4(prop::array::uniform4(prop::sample::select(vec![
            0u32, 2, 2, 4, 8,
        ])))
    }

    fn arb_direction() -> impl Strategy<Value = Direction> {
        prop::sample::select(Direction::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_unchanged_means_identical(grid in arb_grid(), direction in arb_direction()) {
            let (board, tiles) = board_from(grid);
            let outcome = apply_move(&board, &tiles, direction);

            if !outcome.changed {
                prop_assert_eq!(outcome.board, board);
                prop_assert_eq!(outcome.score_delta, 0);
                prop_assert_eq!(outcome.tiles.len(), tiles.len());
            }
        }

        #[test]
        fn prop_total_value_is_conserved(grid in arb_grid(), direction in arb_direction()) {
            let (board, tiles) = board_from(grid);
            let before: u64 = tiles.values().map(|t| u64::from(t.value)).sum();

            let outcome = apply_move(&board, &tiles, direction);
            let after: u64 = outcome.tiles.values().map(|t| u64::from(t.value)).sum();

            prop_assert_eq!(before, after);
        }

        #[test]
        fn prop_score_is_sum_of_doubled_values(grid in arb_grid(), direction in arb_direction()) {
            let (board, tiles) = board_from(grid);
            let outcome = apply_move(&board, &tiles, direction);

            // Each merge removes one tile and contributes its doubled value.
            let merges = tiles.len() - outcome.tiles.len();
            if merges == 0 {
                prop_assert_eq!(outcome.score_delta, 0);
            } else {
                prop_assert!(outcome.score_delta >= 4 * merges as u64);
            }
        }

        #[test]
        fn prop_repeated_move_reaches_fixpoint(grid in arb_grid(), direction in arb_direction()) {
            let (mut board, mut tiles) = board_from(grid);

            // At most N-1 settling passes per line are ever needed.
            for _ in 0..BOARD_SIZE * BOARD_SIZE {
                let outcome = apply_move(&board, &tiles, direction);
                if !outcome.changed {
                    break;
                }
                board = outcome.board;
                tiles = outcome.tiles;
            }

            // Once settled, the move is idempotent.
            let settled = apply_move(&board, &tiles, direction);
            prop_assert!(!settled.changed);
            prop_assert_eq!(settled.board, board);
        }
    }
}
