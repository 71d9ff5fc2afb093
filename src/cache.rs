use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{info, warn};

/// Optional side-channel cache. Account operations never depend on it.
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn ping(&self) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("parse redis url")?;
        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .context("redis connect timed out")?
            .context("redis connect")?;
        let cache = Self { conn };
        cache.ping().await?;
        Ok(cache)
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .context("redis PING")?;
        anyhow::ensure!(pong == "PONG", "unexpected PING reply {pong:?}");
        Ok(())
    }
}

/// Connects if a URL is configured. Any failure is logged and yields `None`.
pub async fn connect_best_effort(url: Option<&str>) -> Option<Arc<dyn CacheClient>> {
    let url = url?;
    match RedisCache::connect(url, Duration::from_secs(3)).await {
        Ok(cache) => {
            info!("cache connected");
            Some(Arc::new(cache) as Arc<dyn CacheClient>)
        }
        Err(e) => {
            warn!(error = %e, "cache unavailable; continuing without it");
            None
        }
    }
}

/// Health label for an optional cache.
pub async fn cache_status(cache: Option<&Arc<dyn CacheClient>>) -> &'static str {
    match cache {
        None => "disabled",
        Some(c) => match c.ping().await {
            Ok(()) => "ok",
            Err(e) => {
                warn!(error = %e, "cache ping failed");
                "error"
            }
        },
    }
}
