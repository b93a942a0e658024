//! In-process registry store.
//!
//! Backs single-node deployments and tests. Expiry uses the tokio clock so
//! paused-time tests can move past a cooldown without sleeping.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::registry::{Registry, RegistryError};

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// A [`Registry`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the map and drop whatever has expired.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        entries.retain(|_, entry| entry.live(now));
        entries
    }

    fn add(&self, key: &str, delta: i64) -> Result<i64, RegistryError> {
        let mut entries = self.entries();
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Int(0),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Int(n) => {
                *n += delta;
                Ok(*n)
            }
            Value::List(_) => Err(RegistryError::WrongType { key: key.to_string() }),
        }
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn list_range(&self, key: &str) -> Result<Vec<String>, RegistryError> {
        match self.entries().get(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => Ok(items.clone()),
            Some(Value::Int(_)) => Err(RegistryError::WrongType { key: key.to_string() }),
        }
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<(), RegistryError> {
        let mut entries = self.entries();
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: Value::List(Vec::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::List(items) => {
                items.push(value.to_string());
                Ok(())
            }
            Value::Int(_) => Err(RegistryError::WrongType { key: key.to_string() }),
        }
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, RegistryError> {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(0);
        };
        let removed = match &mut entry.value {
            Value::List(items) => {
                let before = items.len();
                items.retain(|item| item != value);
                before - items.len()
            }
            Value::Int(_) => return Err(RegistryError::WrongType { key: key.to_string() }),
        };
        // Redis drops empty lists; mirror that.
        if matches!(&entry.value, Value::List(items) if items.is_empty()) {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, RegistryError> {
        match self.entries().get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Int(n)) => Ok(Some(*n)),
            Some(Value::List(_)) => Err(RegistryError::WrongType { key: key.to_string() }),
        }
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), RegistryError> {
        self.entries().insert(
            key.to_string(),
            Entry {
                value: Value::Int(value),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, RegistryError> {
        self.add(key, 1)
    }

    async fn decr(&self, key: &str) -> Result<i64, RegistryError> {
        self.add(key, -1)
    }

    async fn delete(&self, key: &str) -> Result<(), RegistryError> {
        self.entries().remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<i64>, RegistryError> {
        let mut entries = self.entries();
        match entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Int(n)) => {
                let n = *n;
                entries.remove(key);
                Ok(Some(n))
            }
            Some(Value::List(_)) => Err(RegistryError::WrongType { key: key.to_string() }),
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        self.entries().insert(
            key.to_string(),
            Entry {
                value: Value::Int(value),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, RegistryError> {
        Ok(self.entries().contains_key(key))
    }
}
