//! Response cache keyed by semantic request content.
//!
//! Keys are a sha256 over a canonical JSON rendering of (prompt, provider,
//! options), so key order on the wire never causes a spurious miss. The
//! store is shared (redis); an unreachable store degrades to "caching
//! disabled for this call" and never fails the request.

use crate::config::CacheConfig;
use crate::types::{CompletionOptions, CompletionResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Stable cache key for a request's semantic content.
///
/// `serde_json::Value` maps are BTreeMap-backed, so object keys serialize
/// sorted regardless of struct field order, and absent options are omitted
/// entirely.
pub fn cache_key(prompt: &str, provider: &str, options: &CompletionOptions) -> String {
    let material = serde_json::json!({
        "prompt": prompt,
        "provider": provider,
        "options": options,
    });
    let digest = Sha256::digest(material.to_string().as_bytes());
    format!("llm_cache:{}", hex::encode(digest))
}

/// Raw string storage behind the cache. Implementations must expire entries
/// after the given TTL.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_ex(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()>;
}

/// Shared redis backend.
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.context("redis GET failed")?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl_seconds)
            .await
            .context("redis SETEX failed")?;
        Ok(())
    }
}

/// Process-local backend for tests and redis-less deployments. Expired
/// entries are dropped on read and swept on every insert, so the map stays
/// bounded by the live working set.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.retain(|_, (_, expires_at)| now < *expires_at);
        entries.insert(key.to_string(), (value, now + Duration::from_secs(ttl_seconds)));
        Ok(())
    }
}

/// The cache as the orchestrator sees it: get/set of completion responses,
/// with every storage failure swallowed and logged.
pub struct CacheStore {
    backend: Option<Arc<dyn CacheBackend>>,
    ttl_seconds: u64,
    enabled: bool,
}

impl CacheStore {
    pub fn new(backend: Option<Arc<dyn CacheBackend>>, config: &CacheConfig) -> Self {
        Self {
            backend,
            ttl_seconds: config.ttl_seconds,
            enabled: config.enabled,
        }
    }

    /// A store that never caches, for deployments without a backend.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            ttl_seconds: 0,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.backend.is_some()
    }

    /// Whether the backing store currently answers reads.
    pub async fn healthy(&self) -> bool {
        match &self.backend {
            Some(backend) => backend.get("health_check").await.is_ok(),
            None => false,
        }
    }

    /// Cached response for `key`, or None. Storage errors degrade to a miss.
    pub async fn get(&self, key: &str) -> Option<CompletionResponse> {
        let backend = self.backend.as_ref()?;
        if !self.enabled {
            return None;
        }

        let raw = match backend.get(key).await {
            Ok(value) => value?,
            Err(err) => {
                warn!(error = %err, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(response) => Some(response),
            Err(err) => {
                warn!(error = %err, "cached entry unreadable, treating as miss");
                None
            }
        }
    }

    /// Best-effort write; failures are logged, never raised.
    pub async fn set(&self, key: &str, response: &CompletionResponse) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if !self.enabled {
            return;
        }

        let serialized = match serde_json::to_string(response) {
            Ok(s) => s,
            Err(err) => {
                warn!(error = %err, "failed to serialize response for cache");
                return;
            }
        };

        if let Err(err) = backend.set_ex(key, serialized, self.ttl_seconds).await {
            warn!(error = %err, "cache write failed");
        } else {
            debug!(key, "response cached");
        }
    }
}
