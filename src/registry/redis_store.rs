//! Redis-backed registry store.
//!
//! Shared by every gateway instance and the discovery process. The
//! `ConnectionManager` reconnects on its own; a failed command surfaces as
//! [`RegistryError::Backend`] and the caller decides whether the request fails.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::registry::{Registry, RegistryError};

impl From<redis::RedisError> for RegistryError {
    fn from(e: redis::RedisError) -> Self {
        if e.kind() == redis::ErrorKind::TypeError {
            RegistryError::WrongType {
                key: e.detail().unwrap_or_default().to_string(),
            }
        } else {
            RegistryError::Backend(e.to_string())
        }
    }
}

/// A [`Registry`] stored in Redis.
#[derive(Clone)]
pub struct RedisRegistry {
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRegistry").finish_non_exhaustive()
    }
}

impl RedisRegistry {
    /// Open a managed connection to `url` (e.g. `redis://redis:6379`).
    pub async fn connect(url: &str) -> Result<Self, RegistryError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl Registry for RedisRegistry {
    async fn list_range(&self, key: &str) -> Result<Vec<String>, RegistryError> {
        Ok(self.conn().lrange(key, 0, -1).await?)
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<(), RegistryError> {
        let _: i64 = self.conn().rpush(key, value).await?;
        Ok(())
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, RegistryError> {
        Ok(self.conn().lrem(key, 0, value).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, RegistryError> {
        Ok(self.conn().get(key).await?)
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), RegistryError> {
        let _: () = self.conn().set(key, value).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, RegistryError> {
        Ok(self.conn().incr(key, 1).await?)
    }

    async fn decr(&self, key: &str) -> Result<i64, RegistryError> {
        Ok(self.conn().decr(key, 1).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), RegistryError> {
        let _: i64 = self.conn().del(key).await?;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<i64>, RegistryError> {
        Ok(self.conn().get_del(key).await?)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        // PSETEX rejects a zero TTL.
        let millis = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
        let _: () = self.conn().pset_ex(key, value, millis).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, RegistryError> {
        Ok(self.conn().exists(key).await?)
    }
}
