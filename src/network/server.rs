//! WebSocket Game Server
//!
//! Async WebSocket server for game synchronization. Accepts connections,
//! routes protocol messages to the session store, and feeds accepted
//! writes to the update broadcaster.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::network::broadcaster::UpdateBroadcaster;
use crate::network::protocol::{parse_game_id, ClientMessage, ServerError, ServerMessage};
use crate::store::games::GameStore;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Interval between dead-connection sweeps.
    pub cleanup_interval: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            max_connections: 1000,
            cleanup_interval: Duration::from_secs(30),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Build a config from environment variables, falling back to defaults.
    ///
    /// Honors `GRIDMERGE_ADDR` and `GRIDMERGE_MAX_CONNECTIONS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("GRIDMERGE_ADDR") {
            match addr.parse() {
                Ok(parsed) => config.bind_addr = parsed,
                Err(e) => warn!("Ignoring GRIDMERGE_ADDR {:?}: {}", addr, e),
            }
        }
        if let Ok(max) = std::env::var("GRIDMERGE_MAX_CONNECTIONS") {
            match max.parse() {
                Ok(parsed) => config.max_connections = parsed,
                Err(e) => warn!("Ignoring GRIDMERGE_MAX_CONNECTIONS {:?}: {}", max, e),
            }
        }
        config
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Connected client state.
struct ConnectedClient {
    /// Connection time.
    connected_at: Instant,
    /// Message sender (for direct messaging to client).
    sender: mpsc::Sender<ServerMessage>,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session store.
    store: Arc<GameStore>,
    /// Update fan-out.
    broadcaster: Arc<UpdateBroadcaster>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(
        config: ServerConfig,
        store: Arc<GameStore>,
        broadcaster: Arc<UpdateBroadcaster>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            store,
            broadcaster,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Signal the accept loop and all connections to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the server.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            "Game server v{} listening on {}",
            self.config.version, self.config.bind_addr
        );

        // Spawn the update relay task
        let relay_broadcaster = self.broadcaster.clone();
        let relay_handle = tokio::spawn(async move {
            if let Err(e) = relay_broadcaster.run().await {
                error!("Update relay stopped: {}", e);
            }
        });

        // Spawn dead-connection cleanup task
        let cleanup_clients = self.clients.clone();
        let cleanup_broadcaster = self.broadcaster.clone();
        let cleanup_interval = self.config.cleanup_interval;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, cleanup_broadcaster, cleanup_interval).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        relay_handle.abort();
        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let store = self.store.clone();
        let broadcaster = self.broadcaster.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(
                    addr,
                    ConnectedClient {
                        connected_at: Instant::now(),
                        sender: msg_tx.clone(),
                    },
                );
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError {
                                            code: crate::network::protocol::ErrorCode::InvalidPayload,
                                            message: "Invalid message format".to_string(),
                                        })).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &store,
                                    &broadcaster,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();
            broadcaster.unwatch_all(addr).await;

            let connected_for = {
                let mut clients = clients.write().await;
                clients.remove(&addr).map(|c| c.connected_at.elapsed())
            };

            if let Some(elapsed) = connected_for {
                info!("Client {} cleaned up after {:?}", addr, elapsed);
            }
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        store: &Arc<GameStore>,
        broadcaster: &Arc<UpdateBroadcaster>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::CreateGame { state } => {
                match store.create(state).await {
                    Ok(id) => {
                        broadcaster.watch(id, addr, sender.clone()).await;
                        let _ = sender
                            .send(ServerMessage::GameCreated {
                                id: id.to_uuid_string(),
                            })
                            .await;
                        debug!("Client {} created game {}", addr, id);
                    }
                    Err(err) => {
                        warn!("Create from {} rejected: {}", addr, err);
                        let _ = sender
                            .send(ServerMessage::Error(ServerError::from_store(&err)))
                            .await;
                    }
                }
            }
            ClientMessage::ReadGame { id } => {
                let Some(game_id) = parse_game_id(&id) else {
                    let _ = sender
                        .send(ServerMessage::Error(ServerError::malformed_id(&id)))
                        .await;
                    return;
                };

                match store.read(&game_id).await {
                    Ok(state) => {
                        // Reading a game makes this connection an observer
                        broadcaster.watch(game_id, addr, sender.clone()).await;
                        let _ = sender.send(ServerMessage::Game { state }).await;
                    }
                    Err(err) => {
                        let _ = sender
                            .send(ServerMessage::Error(ServerError::from_store(&err)))
                            .await;
                    }
                }
            }
            ClientMessage::ListGames => match store.list().await {
                Ok(listing) => {
                    let _ = sender
                        .send(ServerMessage::GameList {
                            games: listing.games,
                            skipped: listing.skipped,
                        })
                        .await;
                }
                Err(err) => {
                    let _ = sender
                        .send(ServerMessage::Error(ServerError::from_store(&err)))
                        .await;
                }
            },
            ClientMessage::UpdateGame { state } => {
                match store.write(&state).await {
                    Ok(id) => {
                        broadcaster.watch(id, addr, sender.clone()).await;
                        let _ = sender
                            .send(ServerMessage::UpdateAck {
                                id: id.to_uuid_string(),
                            })
                            .await;

                        // Best-effort fan-out; the write already stands.
                        if let Err(e) = broadcaster.notify(&state, addr).await {
                            error!("Broadcast for {} failed: {}", id, e);
                        }
                    }
                    Err(err) => {
                        // The client's speculative state is not applied.
                        warn!("Update from {} rejected: {}", addr, err);
                        let _ = sender
                            .send(ServerMessage::Error(ServerError::from_store(&err)))
                            .await;
                    }
                }
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender
                    .send(ServerMessage::Pong {
                        timestamp,
                        server_time: std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_millis() as u64,
                    })
                    .await;
            }
        }
    }

    /// Periodically drop registry entries whose connection task died.
    async fn run_cleanup_loop(
        clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        broadcaster: Arc<UpdateBroadcaster>,
        period: Duration,
    ) {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;

            let dead: Vec<SocketAddr> = {
                let clients = clients.read().await;
                clients
                    .iter()
                    .filter(|(_, c)| c.sender.is_closed())
                    .map(|(addr, _)| *addr)
                    .collect()
            };

            if dead.is_empty() {
                continue;
            }

            let mut clients = clients.write().await;
            for addr in dead {
                clients.remove(&addr);
                broadcaster.unwatch_all(addr).await;
                debug!("Swept dead client {}", addr);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::round::new_game;
    use crate::game::spawn::TileAllocator;
    use crate::game::state::{GameId, GameState};
    use crate::network::protocol::ErrorCode;
    use crate::store::backend::MemoryBackend;

    fn sample_state(seed: u8) -> GameState {
        let id = GameId::new([seed; 16]);
        new_game(id, &mut TileAllocator::for_game(&id))
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn setup() -> (Arc<GameStore>, Arc<UpdateBroadcaster>) {
        let backend = Arc::new(MemoryBackend::new());
        (
            Arc::new(GameStore::new(backend.clone())),
            Arc::new(UpdateBroadcaster::new(backend)),
        )
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 1000);
    }

    #[tokio::test]
    async fn test_create_game_acks_with_id() {
        let (store, broadcaster) = setup();
        let (tx, mut rx) = mpsc::channel(8);

        GameServer::handle_client_message(
            addr(1),
            ClientMessage::CreateGame {
                state: sample_state(1),
            },
            &store,
            &broadcaster,
            &tx,
        )
        .await;

        match rx.try_recv().unwrap() {
            ServerMessage::GameCreated { id } => {
                let game_id = parse_game_id(&id).unwrap();
                assert!(store.read(&game_id).await.is_ok());
                // Creator becomes an observer
                assert_eq!(broadcaster.observer_count(&game_id).await, 1);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_malformed_id_is_invalid_payload() {
        let (store, broadcaster) = setup();
        let (tx, mut rx) = mpsc::channel(8);

        GameServer::handle_client_message(
            addr(1),
            ClientMessage::ReadGame {
                id: "not-a-uuid".to_string(),
            },
            &store,
            &broadcaster,
            &tx,
        )
        .await;

        match rx.try_recv().unwrap() {
            ServerMessage::Error(err) => assert_eq!(err.code, ErrorCode::InvalidPayload),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_unknown_id_is_not_found() {
        let (store, broadcaster) = setup();
        let (tx, mut rx) = mpsc::channel(8);

        GameServer::handle_client_message(
            addr(1),
            ClientMessage::ReadGame {
                id: GameId::random().to_uuid_string(),
            },
            &store,
            &broadcaster,
            &tx,
        )
        .await;

        match rx.try_recv().unwrap() {
            ServerMessage::Error(err) => assert_eq!(err.code, ErrorCode::NotFound),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_acks_and_persists() {
        let (store, broadcaster) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        let state = sample_state(1);

        GameServer::handle_client_message(
            addr(1),
            ClientMessage::UpdateGame {
                state: state.clone(),
            },
            &store,
            &broadcaster,
            &tx,
        )
        .await;

        match rx.try_recv().unwrap() {
            ServerMessage::UpdateAck { id } => {
                assert_eq!(id, state.id.to_uuid_string());
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        assert_eq!(store.read(&state.id).await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_invalid_update_reports_not_applied() {
        let (store, broadcaster) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        let mut state = sample_state(1);
        state.tile_order.clear(); // break the order invariant

        GameServer::handle_client_message(
            addr(1),
            ClientMessage::UpdateGame { state: state.clone() },
            &store,
            &broadcaster,
            &tx,
        )
        .await;

        match rx.try_recv().unwrap() {
            ServerMessage::Error(err) => assert_eq!(err.code, ErrorCode::InvalidPayload),
            other => panic!("unexpected reply: {other:?}"),
        }

        // Nothing was persisted
        assert!(store.read(&state.id).await.is_err());
    }

    #[tokio::test]
    async fn test_list_games_reports_all() {
        let (store, broadcaster) = setup();
        let (tx, mut rx) = mpsc::channel(8);

        store.write(&sample_state(1)).await.unwrap();
        store.write(&sample_state(2)).await.unwrap();

        GameServer::handle_client_message(
            addr(1),
            ClientMessage::ListGames,
            &store,
            &broadcaster,
            &tx,
        )
        .await;

        match rx.try_recv().unwrap() {
            ServerMessage::GameList { games, skipped } => {
                assert_eq!(games.len(), 2);
                assert_eq!(skipped, 0);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_fans_out_to_other_observer() {
        let (store, broadcaster) = setup();
        let state = sample_state(1);
        store.write(&state).await.unwrap();

        // Observer on a second connection, registered via read
        let (tx2, mut rx2) = mpsc::channel(8);
        GameServer::handle_client_message(
            addr(2),
            ClientMessage::ReadGame {
                id: state.id.to_uuid_string(),
            },
            &store,
            &broadcaster,
            &tx2,
        )
        .await;
        let _ = rx2.try_recv().unwrap(); // drain the Game reply

        let relay = broadcaster.clone();
        let handle = tokio::spawn(async move { relay.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Originator updates
        let (tx1, mut rx1) = mpsc::channel(8);
        let mut updated = state.clone();
        updated.score = 256;
        GameServer::handle_client_message(
            addr(1),
            ClientMessage::UpdateGame {
                state: updated.clone(),
            },
            &store,
            &broadcaster,
            &tx1,
        )
        .await;

        assert!(matches!(
            rx1.try_recv().unwrap(),
            ServerMessage::UpdateAck { .. }
        ));

        let pushed = tokio::time::timeout(Duration::from_secs(1), rx2.recv())
            .await
            .expect("observer should receive the update")
            .unwrap();
        match pushed {
            ServerMessage::GameUpdated { state: pushed_state, .. } => {
                assert_eq!(pushed_state.score, 256);
            }
            other => panic!("unexpected push: {other:?}"),
        }

        // Originator got no push beyond the ack
        assert!(rx1.try_recv().is_err());

        handle.abort();
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (store, broadcaster) = setup();
        let (tx, mut rx) = mpsc::channel(8);

        GameServer::handle_client_message(
            addr(1),
            ClientMessage::Ping { timestamp: 12345 },
            &store,
            &broadcaster,
            &tx,
        )
        .await;

        match rx.try_recv().unwrap() {
            ServerMessage::Pong { timestamp, .. } => assert_eq!(timestamp, 12345),
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
