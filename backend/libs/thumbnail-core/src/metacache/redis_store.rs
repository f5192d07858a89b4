//! Redis-backed metadata store

use super::MetaStore;
use crate::error::{CacheError, CacheResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

#[derive(Clone)]
pub struct RedisMetaStore {
    redis: SharedRedis,
}

impl RedisMetaStore {
    /// Connect to Redis at `redis_url`
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        info!("Redis metadata store connected");
        Ok(Self::new(Arc::new(Mutex::new(manager))))
    }

    pub fn new(redis: SharedRedis) -> Self {
        Self { redis }
    }
}

#[async_trait::async_trait]
impl MetaStore for RedisMetaStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.redis.lock().await;
        let value: Option<String> = conn.get(key).await.map_err(CacheError::Redis)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(CacheError::Redis),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(CacheError::Redis),
        }
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.del::<_, ()>(key).await.map_err(CacheError::Redis)
    }

    async fn add_member(
        &self,
        set: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.sadd::<_, _, ()>(set, member)
            .await
            .map_err(CacheError::Redis)?;
        if let Some(ttl) = ttl {
            conn.expire::<_, ()>(set, ttl.as_secs().max(1) as i64)
                .await
                .map_err(CacheError::Redis)?;
        }
        Ok(())
    }

    async fn remove_member(&self, set: &str, member: &str) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.srem::<_, _, ()>(set, member)
            .await
            .map_err(CacheError::Redis)
    }

    async fn members(&self, set: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.redis.lock().await;
        let members: Vec<String> = conn.smembers(set).await.map_err(CacheError::Redis)?;
        Ok(members)
    }
}
