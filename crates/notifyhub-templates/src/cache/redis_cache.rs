//! Redis-backed cache: plain string GET/SET with per-entry TTL, namespaced
//! `template:*`.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::{Result, TemplateError};

use super::{NAMESPACE_PREFIX, TemplateCache};

pub struct RedisCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(TemplateError::from)?;
        let manager = client.get_connection_manager().await.map_err(TemplateError::from)?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl TemplateCache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.manager.clone();
        conn.get(key).await.ok().flatten()
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await.map_err(TemplateError::from)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.del(key).await.map_err(TemplateError::from)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn
            .keys(format!("{NAMESPACE_PREFIX}*"))
            .await
            .map_err(TemplateError::from)?;
        if !keys.is_empty() {
            let _: () = conn.del(keys).await.map_err(TemplateError::from)?;
        }
        Ok(())
    }
}
