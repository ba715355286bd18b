//! Persistence Layer
//!
//! Async bridge between engine state and a key-value backend. Everything in
//! here may suspend; nothing in here touches game rules.

pub mod backend;
pub mod games;

pub use backend::{BackendError, KvBackend, MemoryBackend};
pub use games::{GameListing, GameStore, StoreError, GAME_KEY_PREFIX};
