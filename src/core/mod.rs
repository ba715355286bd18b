//! Core deterministic primitives.
//!
//! All types in this module are designed for perfect cross-platform
//! determinism. They are the only source of randomness for the game logic.

pub mod rng;

// Re-export core types
pub use rng::{derive_game_seed, DeterministicRng};
