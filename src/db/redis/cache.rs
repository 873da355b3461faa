use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Resolved metadata for a Spotify track id
    TrackMetadata(String),
    /// Client-credentials access token for the metadata provider
    SpotifyToken,
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::TrackMetadata(track_id) => write!(f, "track:{}", track_id),
            CacheKey::SpotifyToken => write!(f, "spotify:token"),
        }
    }
}

/// Opens a Redis client for `REDIS_URL`
///
/// No connection is made until the first cache read or write.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    Ok(Client::open(redis_url)?)
}

/// A serialized value waiting to be written by the background writer
struct PendingWrite {
    key: String,
    value: String,
    ttl: u64,
}

/// Read-through cache over Redis with fire-and-forget writes
///
/// Reads hit Redis directly. Writes are queued to a single background task
/// so request handlers never wait on them.
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<PendingWrite>,
}

/// Stops the background writer after draining queued writes
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).await.is_err() {
            tracing::warn!("Cache writer already stopped");
        }
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task panicked");
        }
    }
}

impl Cache {
    /// Creates the cache and spawns its writer task
    pub async fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(Self::run_writer(redis_client.clone(), write_rx, shutdown_rx));

        (
            Self {
                redis_client,
                write_tx,
            },
            CacheWriterHandle { shutdown_tx, task },
        )
    }

    async fn run_writer(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<PendingWrite>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer started");

        loop {
            tokio::select! {
                Some(write) = write_rx.recv() => Self::write(&client, write).await,
                _ = shutdown_rx.recv() => break,
            }
        }

        // Cache clones keep the channel open, so drain what is queued now
        // instead of waiting for it to close.
        let mut flushed = 0usize;
        while let Ok(write) = write_rx.try_recv() {
            Self::write(&client, write).await;
            flushed += 1;
        }

        tracing::info!(flushed, "Cache writer stopped");
    }

    async fn write(client: &Client, write: PendingWrite) {
        let PendingWrite { key, value, ttl } = write;
        if let Err(e) = Self::set_ex(client, &key, value, ttl).await {
            tracing::error!(error = %e, key = %key, "Failed to write to Redis cache");
        }
    }

    async fn set_ex(client: &Client, key: &str, value: String, ttl: u64) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, value, ttl).await?;
        Ok(())
    }

    /// Reads and deserializes `key`, `None` on a miss
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;

        let Some(json) = cached else {
            tracing::debug!(key = %key, "Cache miss");
            return Ok(None);
        };

        tracing::debug!(key = %key, "Cache hit");
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| AppError::Internal(format!("Cache deserialization error: {}", e)))
    }

    /// Queues `value` under `key` for `ttl` seconds without waiting
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let value = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, key = %key, "Cache serialization error");
                return;
            }
        };

        let write = PendingWrite {
            key: key.to_string(),
            value,
            ttl,
        };

        if self.write_tx.send(write).is_err() {
            tracing::error!(key = %key, "Cache writer is gone, dropping write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Song;

    #[test]
    fn test_cache_key_display_track_metadata() {
        let key = CacheKey::TrackMetadata("4cOdK2wGLETKBW3PvgPWqT".to_string());
        assert_eq!(key.to_string(), "track:4cOdK2wGLETKBW3PvgPWqT");
    }

    #[test]
    fn test_cache_key_display_spotify_token() {
        assert_eq!(CacheKey::SpotifyToken.to_string(), "spotify:token");
    }

    fn song() -> Song {
        Song {
            name: "Sweet Tooth".to_string(),
            artist: "Cavetown".to_string(),
            genre: "bedroom pop".to_string(),
        }
    }

    /// Cache against `REDIS_URL`, plus a raw client for cleanup
    async fn live_cache() -> (Cache, CacheWriterHandle, Client) {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let client = create_redis_client(&url).unwrap();
        let (cache, writer) = Cache::new(client.clone()).await;
        (cache, writer, client)
    }

    async fn forget(client: &Client, key: &CacheKey) {
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_unknown_track_misses() {
        let (cache, _writer, _client) = live_cache().await;
        let key = CacheKey::TrackMetadata(format!("missing-{}", uuid::Uuid::new_v4()));

        let hit: Option<Song> = cache.get_from_cache(&key).await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_track_metadata_round_trips_through_writer() {
        let (cache, _writer, client) = live_cache().await;
        let key = CacheKey::TrackMetadata(format!("writer-{}", uuid::Uuid::new_v4()));

        cache.set_in_background(&key, &song(), 60);
        let mut hit: Option<Song> = None;
        for _ in 0..20 {
            hit = cache.get_from_cache(&key).await.unwrap();
            if hit.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        assert_eq!(hit, Some(song()));

        forget(&client, &key).await;
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_shutdown_flushes_queued_writes() {
        let (cache, writer, client) = live_cache().await;
        let key = CacheKey::TrackMetadata(format!("flush-{}", uuid::Uuid::new_v4()));

        cache.set_in_background(&key, &song(), 60);
        writer.shutdown().await;

        let hit: Option<Song> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(hit, Some(song()));

        forget(&client, &key).await;
    }
}
