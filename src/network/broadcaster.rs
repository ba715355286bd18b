//! Update Broadcasting
//!
//! After an accepted write, every other observer of that game gets a
//! `GameUpdated` push so their local copies converge. Delivery is
//! best-effort and at-most-once: a dropped notice is not retried, the
//! observer reconciles on its next read.
//!
//! Notices travel through the backend's pub/sub channel, so observers
//! attached to other processes sharing the backend converge too.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, warn};

use crate::game::state::{GameId, GameState};
use crate::network::protocol::ServerMessage;
use crate::store::backend::{BackendError, KvBackend};

/// Pub/sub channel carrying update notices.
pub const UPDATE_CHANNEL: &str = "game-updates";

/// What gets published for one accepted write.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UpdateNotice {
    game_id: GameId,
    origin: SocketAddr,
    state: GameState,
}

/// Fan-out of accepted writes to the other observers of a game.
///
/// An observer is any connection currently displaying a game; the server
/// registers one on create/read/update. The originator of a write is never
/// notified — it already holds the authoritative post-write state.
pub struct UpdateBroadcaster {
    backend: Arc<dyn KvBackend>,
    observers: RwLock<BTreeMap<GameId, BTreeMap<SocketAddr, mpsc::Sender<ServerMessage>>>>,
}

impl UpdateBroadcaster {
    /// Create a broadcaster over a backend.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            observers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register `addr` as an observer of `game_id`.
    pub async fn watch(&self, game_id: GameId, addr: SocketAddr, sender: mpsc::Sender<ServerMessage>) {
        let mut observers = self.observers.write().await;
        observers.entry(game_id).or_default().insert(addr, sender);
    }

    /// Remove `addr` from every observer set (connection closed).
    pub async fn unwatch_all(&self, addr: SocketAddr) {
        let mut observers = self.observers.write().await;
        observers.retain(|_, watchers| {
            watchers.remove(&addr);
            !watchers.is_empty()
        });
    }

    /// Count of observers currently watching `game_id`.
    pub async fn observer_count(&self, game_id: &GameId) -> usize {
        let observers = self.observers.read().await;
        observers.get(game_id).map(|w| w.len()).unwrap_or(0)
    }

    /// Publish an accepted write. Exactly one notice per write.
    pub async fn notify(
        &self,
        state: &GameState,
        origin: SocketAddr,
    ) -> Result<(), BackendError> {
        let notice = UpdateNotice {
            game_id: state.id,
            origin,
            state: state.clone(),
        };
        let raw = serde_json::to_string(&notice)
            .map_err(|e| BackendError::Unavailable(format!("notice encoding failed: {e}")))?;
        self.backend.publish(UPDATE_CHANNEL, &raw).await?;
        Ok(())
    }

    /// Subscribe to the update channel and fan notices out until the
    /// channel closes. Intended to run as one task per process.
    pub async fn run(&self) -> Result<(), BackendError> {
        let mut rx = self.backend.subscribe(UPDATE_CHANNEL).await?;
        loop {
            match rx.recv().await {
                Ok(raw) => self.dispatch(&raw).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // At-most-once: the skipped notices are gone for good.
                    warn!("Update relay lagged, {} notices dropped", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        Ok(())
    }

    /// Deliver one raw notice to the game's observers, except the origin.
    async fn dispatch(&self, raw: &str) {
        let notice: UpdateNotice = match serde_json::from_str(raw) {
            Ok(n) => n,
            Err(e) => {
                error!("Discarding malformed update notice: {}", e);
                return;
            }
        };

        let message = ServerMessage::GameUpdated {
            id: notice.game_id.to_uuid_string(),
            state: notice.state,
        };

        let mut dead = Vec::new();
        {
            let observers = self.observers.read().await;
            let Some(watchers) = observers.get(&notice.game_id) else {
                return;
            };

            for (addr, sender) in watchers {
                if *addr == notice.origin {
                    continue;
                }
                match sender.try_send(message.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        // Observer is lagging; it reconciles on next read.
                        debug!("Observer {} queue full, dropping update", addr);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dead.push(*addr);
                    }
                }
            }
        }

        for addr in dead {
            self.unwatch_all(addr).await;
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
    use crate::store::backend::MemoryBackend;

    fn sample_state(seed: u8) -> GameState {
        let id = GameId::new([seed; 16]);
        new_game(id, &mut TileAllocator::for_game(&id))
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn setup() -> (Arc<MemoryBackend>, UpdateBroadcaster) {
        let backend = Arc::new(MemoryBackend::new());
        let broadcaster = UpdateBroadcaster::new(backend.clone());
        (backend, broadcaster)
    }

    /// Push one notice through publish -> dispatch without the relay loop.
    async fn pump(
        backend: &MemoryBackend,
        broadcaster: &UpdateBroadcaster,
        state: &GameState,
        origin: SocketAddr,
    ) {
        let mut rx = backend.subscribe(UPDATE_CHANNEL).await.unwrap();
        broadcaster.notify(state, origin).await.unwrap();
        let raw = rx.recv().await.unwrap();
        broadcaster.dispatch(&raw).await;
    }

    #[tokio::test]
    async fn test_update_reaches_other_observer_not_originator() {
        let (backend, broadcaster) = setup();
        let state = sample_state(1);

        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        broadcaster.watch(state.id, addr(1), tx1).await;
        broadcaster.watch(state.id, addr(2), tx2).await;

        pump(&backend, &broadcaster, &state, addr(1)).await;

        // Originator hears nothing
        assert!(rx1.try_recv().is_err());

        // The other observer gets the authoritative state
        match rx2.try_recv().unwrap() {
            ServerMessage::GameUpdated { id, state: pushed } => {
                assert_eq!(id, state.id.to_uuid_string());
                assert_eq!(pushed, state);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_observers_of_other_games_not_notified() {
        let (backend, broadcaster) = setup();
        let state_a = sample_state(1);
        let state_b = sample_state(2);

        let (tx, mut rx) = mpsc::channel(8);
        broadcaster.watch(state_b.id, addr(2), tx).await;

        pump(&backend, &broadcaster, &state_a, addr(1)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unwatch_stops_delivery() {
        let (backend, broadcaster) = setup();
        let state = sample_state(1);

        let (tx, mut rx) = mpsc::channel(8);
        broadcaster.watch(state.id, addr(2), tx).await;
        broadcaster.unwatch_all(addr(2)).await;

        pump(&backend, &broadcaster, &state, addr(1)).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(broadcaster.observer_count(&state.id).await, 0);
    }

    #[tokio::test]
    async fn test_full_observer_queue_drops_at_most_once() {
        let (backend, broadcaster) = setup();
        let state = sample_state(1);

        let (tx, mut rx) = mpsc::channel(1);
        broadcaster.watch(state.id, addr(2), tx).await;

        // Two notices into a capacity-1 queue: the second is dropped.
        pump(&backend, &broadcaster, &state, addr(1)).await;
        pump(&backend, &broadcaster, &state, addr(1)).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_observer_is_pruned() {
        let (backend, broadcaster) = setup();
        let state = sample_state(1);

        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        broadcaster.watch(state.id, addr(2), tx).await;

        pump(&backend, &broadcaster, &state, addr(1)).await;

        assert_eq!(broadcaster.observer_count(&state.id).await, 0);
    }

    #[tokio::test]
    async fn test_relay_loop_end_to_end() {
        let (backend, broadcaster) = setup();
        let broadcaster = Arc::new(broadcaster);
        let state = sample_state(1);

        let (tx, mut rx) = mpsc::channel(8);
        broadcaster.watch(state.id, addr(2), tx).await;

        let relay = broadcaster.clone();
        let handle = tokio::spawn(async move { relay.run().await });

        // Give the relay a moment to subscribe before publishing.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        broadcaster.notify(&state, addr(1)).await.unwrap();

        let pushed = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("relay should deliver within a second")
            .unwrap();
        assert!(matches!(pushed, ServerMessage::GameUpdated { .. }));

        handle.abort();
    }

    #[tokio::test]
    async fn test_malformed_notice_is_discarded() {
        let (_, broadcaster) = setup();
        // Must not panic
        broadcaster.dispatch("not a notice").await;
    }
}
