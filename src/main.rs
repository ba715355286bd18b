//! Gridmerge Game Server
//!
//! Authoritative synchronization server for gridmerge games.
//! Holds the canonical state per game id and fans accepted writes out to
//! every other observer.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use gridmerge::network::broadcaster::UpdateBroadcaster;
use gridmerge::network::server::{GameServer, ServerConfig};
use gridmerge::store::backend::MemoryBackend;
use gridmerge::store::games::GameStore;
use gridmerge::{BOARD_SIZE, VERSION, WIN_TILE_VALUE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Gridmerge Server v{}", VERSION);
    info!("Board: {}x{}, win tile: {}", BOARD_SIZE, BOARD_SIZE, WIN_TILE_VALUE);

    let config = ServerConfig::from_env();

    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(GameStore::new(backend.clone()));
    let broadcaster = Arc::new(UpdateBroadcaster::new(backend));

    let server = GameServer::new(config, store, broadcaster);
    server.run().await.context("Server failed")?;

    Ok(())
}
