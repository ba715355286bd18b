//! Game State Definitions
//!
//! All state types for a single puzzle instance.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::BOARD_SIZE;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique game identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GameId(pub [u8; 16]);

impl GameId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create a fresh random identifier.
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid_string())
    }
}

impl Serialize for GameId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_uuid_string())
    }
}

impl<'de> Deserialize<'de> for GameId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_uuid_str(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid game id: {s}")))
    }
}

/// Unique tile identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TileId(pub [u8; 16]);

impl TileId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from RNG output, stamped with UUIDv4 version/variant bits
    /// so the id round-trips through the string encoding.
    pub fn from_rng_bytes(mut bytes: [u8; 16]) -> Self {
        bytes[6] = (bytes[6] & 0x0F) | 0x40;
        bytes[8] = (bytes[8] & 0x3F) | 0x80;
        Self(bytes)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid_string())
    }
}

impl Serialize for TileId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_uuid_string())
    }
}

impl<'de> Deserialize<'de> for TileId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_uuid_str(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid tile id: {s}")))
    }
}

// =============================================================================
// COORDINATES
// =============================================================================

/// A cell coordinate on the board. `0 <= x, y < BOARD_SIZE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coord {
    /// Column, 0 at the left edge.
    pub x: u8,
    /// Row, 0 at the top edge.
    pub y: u8,
}

impl Coord {
    /// Create a coordinate.
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// TILE
// =============================================================================

/// A single tile on the board.
///
/// Owned exclusively by the board that contains it; destroyed when merged
/// into another tile or when the game is reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Unique tile identifier.
    pub id: TileId,
    /// Current cell.
    pub position: Coord,
    /// Tile value, a positive power of two.
    pub value: u32,
}

impl Tile {
    /// Create a new tile.
    pub const fn new(id: TileId, position: Coord, value: u32) -> Self {
        Self { id, position, value }
    }
}

/// Map from tile id to tile. BTreeMap for deterministic iteration.
pub type TileMap = BTreeMap<TileId, Tile>;

// =============================================================================
// BOARD
// =============================================================================

/// The NxN grid of optional tile references, indexed `[y][x]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [[Option<TileId>; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    /// Create an empty board.
    pub const fn empty() -> Self {
        Self {
            cells: [[None; BOARD_SIZE]; BOARD_SIZE],
        }
    }

    /// Get the tile id at a cell.
    #[inline]
    pub fn get(&self, at: Coord) -> Option<TileId> {
        self.cells[at.y as usize][at.x as usize]
    }

    /// Place a tile id at a cell.
    #[inline]
    pub fn set(&mut self, at: Coord, id: TileId) {
        self.cells[at.y as usize][at.x as usize] = Some(id);
    }

    /// Clear a cell.
    #[inline]
    pub fn clear(&mut self, at: Coord) {
        self.cells[at.y as usize][at.x as usize] = None;
    }

    /// All empty cell coordinates, column-major (x outer, y inner).
    pub fn empty_cells(&self) -> Vec<Coord> {
        let mut results = Vec::new();
        for x in 0..BOARD_SIZE as u8 {
            for y in 0..BOARD_SIZE as u8 {
                if self.get(Coord::new(x, y)).is_none() {
                    results.push(Coord::new(x, y));
                }
            }
        }
        results
    }

    /// Whether every cell is occupied.
    pub fn is_full(&self) -> bool {
        self.cells.iter().flatten().all(|c| c.is_some())
    }

    /// Iterate over all occupied cells as `(Coord, TileId)`.
    pub fn occupied(&self) -> impl Iterator<Item = (Coord, TileId)> + '_ {
        self.cells.iter().enumerate().flat_map(|(y, row)| {
            row.iter().enumerate().filter_map(move |(x, cell)| {
                cell.map(|id| (Coord::new(x as u8, y as u8), id))
            })
        })
    }
}

// =============================================================================
// GAME STATUS
// =============================================================================

/// Lifecycle status of a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Game accepts moves.
    #[default]
    Ongoing,
    /// A tile reached the win value.
    Won,
    /// Board is full with no legal move left.
    Lost,
}

impl GameStatus {
    /// Whether the game no longer accepts moves.
    pub fn is_terminal(self) -> bool {
        !matches!(self, GameStatus::Ongoing)
    }
}

// =============================================================================
// STATE VALIDATION ERRORS
// =============================================================================

/// Referential-integrity violations in a [`GameState`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// A board cell references an id missing from the tile map.
    #[error("cell {at} references unknown tile {id}")]
    UnknownTile {
        /// Offending cell.
        at: Coord,
        /// Dangling reference.
        id: TileId,
    },

    /// A tile's recorded position does not point back at its cell.
    #[error("tile {id} claims {at} but the board disagrees")]
    PositionMismatch {
        /// Offending tile.
        id: TileId,
        /// Position the tile claims.
        at: Coord,
    },

    /// A tile in the map is not placed on any cell.
    #[error("tile {id} is not on the board")]
    Unplaced {
        /// Orphaned tile.
        id: TileId,
    },

    /// A tile value is not a positive power of two.
    #[error("tile {id} has non power-of-two value {value}")]
    BadValue {
        /// Offending tile.
        id: TileId,
        /// Its value.
        value: u32,
    },

    /// The creation-order list disagrees with the tile map.
    #[error("tile order is not a permutation of the tile map")]
    OrderMismatch,
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Complete state of one game instance.
///
/// Mutated only through [`crate::game::round::advance`] and tile spawning;
/// everything else reads it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Game identifier.
    pub id: GameId,

    /// The grid of tile references.
    pub board: Board,

    /// All live tiles, keyed by id.
    pub tiles: BTreeMap<TileId, Tile>,

    /// Tile ids in creation order (render order for the UI).
    pub tile_order: Vec<TileId>,

    /// True while a move is mid-settle. Settled snapshots carry false.
    pub has_changed: bool,

    /// Accumulated score. Never decreases within a game's lifetime.
    pub score: u64,

    /// Current lifecycle status.
    pub status: GameStatus,
}

impl GameState {
    /// Create an empty game with no tiles.
    pub fn empty(id: GameId) -> Self {
        Self {
            id,
            board: Board::empty(),
            tiles: BTreeMap::new(),
            tile_order: Vec::new(),
            has_changed: false,
            score: 0,
            status: GameStatus::Ongoing,
        }
    }

    /// Place a freshly created tile: board cell, tile map, creation order.
    pub fn insert_tile(&mut self, tile: Tile) {
        self.board.set(tile.position, tile.id);
        self.tile_order.push(tile.id);
        self.tiles.insert(tile.id, tile);
    }

    /// Drop ids from the creation order that no longer exist in the tile map
    /// (consumed by a merge).
    pub fn compact_order(&mut self) {
        self.tile_order.retain(|id| self.tiles.contains_key(id));
    }

    /// Live tiles in creation order, for rendering.
    pub fn tiles_in_order(&self) -> impl Iterator<Item = &Tile> + '_ {
        self.tile_order.iter().filter_map(|id| self.tiles.get(id))
    }

    /// Number of live tiles.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Check referential invariants.
    ///
    /// Every occupied cell must name a tile in the map, every tile must sit
    /// on exactly the cell its position names, the creation order must be a
    /// permutation of the map keys, and values must be positive powers of two.
    pub fn validate(&self) -> Result<(), StateError> {
        for (at, id) in self.board.occupied() {
            let tile = self
                .tiles
                .get(&id)
                .ok_or(StateError::UnknownTile { at, id })?;
            if tile.position != at {
                return Err(StateError::PositionMismatch {
                    id,
                    at: tile.position,
                });
            }
        }

        for tile in self.tiles.values() {
            if self.board.get(tile.position) != Some(tile.id) {
                return Err(StateError::Unplaced { id: tile.id });
            }
            if tile.value < 2 || !tile.value.is_power_of_two() {
                return Err(StateError::BadValue {
                    id: tile.id,
                    value: tile.value,
                });
            }
        }

        let mut seen = std::collections::BTreeSet::new();
        if self.tile_order.len() != self.tiles.len()
            || !self
                .tile_order
                .iter()
                .all(|id| self.tiles.contains_key(id) && seen.insert(*id))
        {
            return Err(StateError::OrderMismatch);
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
