//! Distributed fixed-window rate limiting.
//!
//! Counters live in a shared store keyed by identity and window bucket, so
//! every gateway instance enforces the same quota. A store failure fails
//! OPEN: availability is preferred over strict enforcement, and the bucket
//! naturally expires with the window even if the TTL write is lost.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::types::Principal;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Shared counter storage. `increment` is atomic and sets the window TTL on
/// the first increment of a key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(&self, key: &str, window_ms: u64) -> Result<u64>;
}

/// Redis-backed counters: INCR, then PEXPIRE on first increment. A crash
/// between the two steps leaves a counter without expiry, which is
/// reclaimed when the bucket index rolls over.
pub struct RedisCounter {
    conn: redis::aio::ConnectionManager,
}

impl RedisCounter {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CounterStore for RedisCounter {
    async fn increment(&self, key: &str, window_ms: u64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.incr(key, 1u64).await.context("redis INCR failed")?;
        if count == 1 {
            let _: bool = conn
                .pexpire(key, window_ms as i64)
                .await
                .context("redis PEXPIRE failed")?;
        }
        Ok(count)
    }
}

/// Process-local counters for tests and redis-less deployments. The bucket
/// index embedded in each key stands in for TTL expiry: when a key from a
/// newer bucket arrives, counters from older buckets are dropped.
#[derive(Default)]
pub struct MemoryCounter {
    counters: Mutex<HashMap<String, u64>>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Trailing `:{bucket}` segment of a counter key.
fn bucket_suffix(key: &str) -> Option<u64> {
    key.rsplit(':').next()?.parse().ok()
}

#[async_trait]
impl CounterStore for MemoryCounter {
    async fn increment(&self, key: &str, _window_ms: u64) -> Result<u64> {
        let mut counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(current) = bucket_suffix(key) {
            counters.retain(|k, _| bucket_suffix(k).map_or(true, |b| b >= current));
        }
        let count = counters.entry(key.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    window_ms: u64,
    default_max: u64,
    config: Arc<GatewayConfig>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: Arc<GatewayConfig>) -> Self {
        Self {
            store,
            window_ms: config.rate_limit.window_ms,
            default_max: config.rate_limit.max_requests,
            config,
        }
    }

    /// Allow or deny one request for this caller in the current window.
    pub async fn check(&self, principal: &Principal) -> Result<(), GatewayError> {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.check_at(principal, now_ms).await
    }

    /// The window bucket is floor(now / window); each check increments the
    /// bucket's counter and compares the post-increment count with the
    /// role quota. Exceeding the quota denies without decrementing.
    pub(crate) async fn check_at(
        &self,
        principal: &Principal,
        now_ms: u64,
    ) -> Result<(), GatewayError> {
        let role = principal.role();
        let max_requests = if self.config.role_limits.contains_key(role) {
            self.config.role_limit(role).max_requests_per_minute
        } else {
            self.default_max
        };

        let identity = principal.rate_identity();
        let bucket = now_ms / self.window_ms.max(1);
        let key = format!("rate_limit:{}:{}", identity, bucket);

        match self.store.increment(&key, self.window_ms).await {
            Ok(count) if count > max_requests => {
                warn!(identity, role, max_requests, "rate limit exceeded");
                Err(GatewayError::RateLimited)
            }
            Ok(_) => Ok(()),
            Err(err) => {
                // Fail open: a broken store must not block traffic.
                warn!(error = %err, "rate limiter degraded, allowing request");
                Ok(())
            }
        }
    }
}
