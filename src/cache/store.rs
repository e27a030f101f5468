//! Cache store implementation

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::entry::{CacheEntry, KeyTtl};

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
  pub keys: usize,
  pub hits: u64,
  pub misses: u64,
  pub expired: u64,
}

impl CacheStats {
  pub fn hit_rate(&self) -> f64 {
    let total = self.hits + self.misses;
    if total == 0 {
      0.0
    } else {
      self.hits as f64 / total as f64
    }
  }
}

/// Key-value operations the cache layer needs from a backend.
///
/// Values are opaque strings. `set_if_absent` and `delete_if_equals` must be
/// single atomic operations on the backend, never a read followed by a write.
#[async_trait]
pub trait CacheStore: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError>;

  /// Overwrite `key`. `ttl = None` stores the value without expiry.
  async fn set(&self, key: &str, value: &str, ttl: Option<Duration>)
    -> Result<(), CacheStoreError>;

  /// Returns true iff this call created the entry.
  async fn set_if_absent(
    &self,
    key: &str,
    value: &str,
    ttl: Duration,
  ) -> Result<bool, CacheStoreError>;

  /// Idempotent. Returns whether a key was removed.
  async fn delete(&self, key: &str) -> Result<bool, CacheStoreError>;

  /// Remove `key` only if it currently holds `expected`.
  async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, CacheStoreError>;

  async fn ttl(&self, key: &str) -> Result<KeyTtl, CacheStoreError>;
}

/// Store operation error
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheStoreError {
  #[error("store unavailable: {0}")]
  Unavailable(String),
}

/// In-memory cache store implementation
pub struct InMemoryCacheStore {
  data: RwLock<HashMap<String, CacheEntry>>,
  hits: AtomicU64,
  misses: AtomicU64,
  expired: AtomicU64,
}

impl Default for InMemoryCacheStore {
  fn default() -> Self {
    Self::new()
  }
}

impl InMemoryCacheStore {
  pub fn new() -> Self {
    Self {
      data: RwLock::new(HashMap::new()),
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      expired: AtomicU64::new(0),
    }
  }

  /// Check and evict expired entries
  pub fn evict_expired(&self) -> usize {
    let mut data = self.data.write();
    let before = data.len();
    data.retain(|_, entry| !entry.is_expired());
    let count = before - data.len();
    self.expired.fetch_add(count as u64, Ordering::Relaxed);
    count
  }

  pub fn stats(&self) -> CacheStats {
    let data = self.data.read();
    CacheStats {
      keys: data.values().filter(|e| !e.is_expired()).count(),
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      expired: self.expired.load(Ordering::Relaxed),
    }
  }

  /// Drop `key` if it has expired. Caller holds the write lock.
  fn purge_if_expired(&self, data: &mut HashMap<String, CacheEntry>, key: &str) {
    if data.get(key).is_some_and(|e| e.is_expired()) {
      data.remove(key);
      self.expired.fetch_add(1, Ordering::Relaxed);
    }
  }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
  async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
    let mut data = self.data.write();
    self.purge_if_expired(&mut data, key);

    match data.get(key) {
      Some(entry) => {
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry.value.clone()))
      }
      None => {
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
      }
    }
  }

  async fn set(
    &self,
    key: &str,
    value: &str,
    ttl: Option<Duration>,
  ) -> Result<(), CacheStoreError> {
    let entry = CacheEntry::new(value.to_string(), ttl);
    self.data.write().insert(key.to_string(), entry);
    Ok(())
  }

  async fn set_if_absent(
    &self,
    key: &str,
    value: &str,
    ttl: Duration,
  ) -> Result<bool, CacheStoreError> {
    let mut data = self.data.write();
    self.purge_if_expired(&mut data, key);

    if data.contains_key(key) {
      return Ok(false);
    }
    data.insert(key.to_string(), CacheEntry::new(value.to_string(), Some(ttl)));
    Ok(true)
  }

  async fn delete(&self, key: &str) -> Result<bool, CacheStoreError> {
    let mut data = self.data.write();
    Ok(
      data
        .remove(key)
        .map(|entry| !entry.is_expired())
        .unwrap_or(false),
    )
  }

  async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, CacheStoreError> {
    let mut data = self.data.write();
    self.purge_if_expired(&mut data, key);

    match data.get(key) {
      Some(entry) if entry.value == expected => {
        data.remove(key);
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn ttl(&self, key: &str) -> Result<KeyTtl, CacheStoreError> {
    let data = self.data.read();
    Ok(match data.get(key) {
      None => KeyTtl::Missing,
      Some(entry) if entry.is_expired() => KeyTtl::Missing,
      Some(entry) => entry
        .ttl_remaining()
        .map(KeyTtl::Expires)
        .unwrap_or(KeyTtl::Persistent),
    })
  }
}

/// Periodically sweep expired entries out of an in-memory store
pub async fn run_expiration_task(store: Arc<InMemoryCacheStore>, interval: Duration) {
  loop {
    tokio::time::sleep(interval).await;
    let expired = store.evict_expired();
    if expired > 0 {
      tracing::debug!("Evicted {} expired keys", expired);
    }
  }
}
