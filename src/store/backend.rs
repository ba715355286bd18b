//! Key-Value Backend Abstraction
//!
//! The persistence and pub/sub surface the store layer is written against:
//! get/set/mget, prefix key enumeration, and publish/subscribe. The bundled
//! [`MemoryBackend`] is the in-process deployment variant; a networked
//! backend implements the same trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

/// Capacity of each pub/sub channel before slow subscribers lag.
const CHANNEL_CAPACITY: usize = 256;

/// Backend failures. Always retryable from the caller's perspective.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached or refused the operation.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Abstract key-value store with pub/sub.
///
/// All operations are asynchronous; implementations must be safe to share
/// across tasks behind an `Arc`.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Fetch the value stored at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store `value` at `key`, overwriting any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Fetch many keys at once; the result aligns index-wise with `keys`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, BackendError>;

    /// Enumerate all keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, BackendError>;

    /// Publish a message to a channel. Returns the subscriber count.
    async fn publish(&self, channel: &str, message: &str) -> Result<usize, BackendError>;

    /// Subscribe to a channel.
    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>, BackendError>;
}

/// In-memory backend. Constructed once at process start.
///
/// BTreeMap keeps `keys` enumeration sorted, which makes listings stable.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, String>>,
    channels: RwLock<BTreeMap<String, broadcast::Sender<String>>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel_sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, BackendError> {
        let entries = self.entries.read().await;
        Ok(keys.iter().map(|k| entries.get(k).cloned()).collect())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        let entries = self.entries.read().await;
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, BackendError> {
        let sender = self.channel_sender(channel).await;
        // send() errs when nobody is subscribed; that is not a failure here
        Ok(sender.send(message.to_string()).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>, BackendError> {
        Ok(self.channel_sender(channel).await.subscribe())
    }
}

// =============================================================================
// TESTS
// =============================================================================
