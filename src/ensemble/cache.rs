use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[cfg(test)]
use mockall::automock;

use super::types::EnsemblePrediction;
use crate::core::config::MAX_CACHE_TTL_SECS;
use crate::core::error::{EnsembleError, EnsembleResult};

/// Shared store for finished ensemble results. Writers may race; entries
/// for the same key are interchangeable so last write wins.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EnsembleCache: Send + Sync {
    async fn get(&self, key: &str) -> EnsembleResult<Option<EnsemblePrediction>>;
    async fn set(&self, key: &str, value: &EnsemblePrediction, ttl_secs: u64) -> EnsembleResult<()>;
}

struct CacheEntry {
    value: EnsemblePrediction,
    expires_at: Instant,
}

/// In-process cache. Expired entries are dropped lazily on read or by `purge_expired`.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!("🧹 Purged {} expired ensemble entries", purged);
        }
        purged
    }
}

#[async_trait]
impl EnsembleCache for MemoryCache {
    async fn get(&self, key: &str) -> EnsembleResult<Option<EnsemblePrediction>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).map_or(false, |e| e.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &EnsemblePrediction, ttl_secs: u64) -> EnsembleResult<()> {
        if ttl_secs == 0 {
            return Ok(());
        }

        let entry = CacheEntry {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(ttl_secs.min(MAX_CACHE_TTL_SECS)),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }
}

/// Redis-backed cache shared across service instances. Values are stored as JSON.
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> EnsembleResult<Self> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;

        tracing::info!("✅ Connected to redis cache");
        Ok(Self { connection })
    }

    pub async fn ping(&self) -> EnsembleResult<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(e: impl std::fmt::Display) -> EnsembleError {
    EnsembleError::CacheUnavailable(e.to_string())
}

#[async_trait]
impl EnsembleCache for RedisCache {
    async fn get(&self, key: &str) -> EnsembleResult<Option<EnsemblePrediction>> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        match payload {
            Some(payload) => match serde_json::from_str(&payload) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    // A payload written by an incompatible build is just a miss.
                    tracing::warn!("⚠️  Discarding undecodable cache entry {}: {}", key, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &EnsemblePrediction, ttl_secs: u64) -> EnsembleResult<()> {
        if ttl_secs == 0 {
            return Ok(());
        }

        let payload = serde_json::to_string(value)
            .map_err(|e| EnsembleError::Internal(format!("serialize ensemble: {}", e)))?;

        let mut conn = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
