//! Store-backed mutual exclusion for cache rebuilds
//!
//! A lock is a key created with `set_if_absent` and a short TTL, so a holder
//! that crashes cannot block others for longer than the TTL. The stored value
//! is a random token; the normal release path only deletes the key while it
//! still holds that token, so a holder whose lock expired cannot release a
//! lock someone else has since acquired.
//!
//! Mutual exclusion is advisory: once the TTL elapses a second holder can
//! acquire the key while the first is still running.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::cache::{CacheStore, CacheStoreError};

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct DistributedMutex {
  store: Arc<dyn CacheStore>,
  ttl: Duration,
}

impl DistributedMutex {
  pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
    Self { store, ttl }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  /// Non-blocking acquire. `None` means someone else holds the lock.
  pub async fn try_lock(&self, lock_key: &str) -> Result<Option<LockGuard>, CacheStoreError> {
    let token = Uuid::new_v4().to_string();
    if !self.store.set_if_absent(lock_key, &token, self.ttl).await? {
      tracing::debug!(lock_key, "Lock busy");
      return Ok(None);
    }

    tracing::debug!(lock_key, "Lock acquired");
    Ok(Some(LockGuard {
      store: self.store.clone(),
      key: lock_key.to_string(),
      token,
      released: false,
    }))
  }

  /// Unconditionally delete the lock key, whoever holds it.
  pub async fn unlock(&self, lock_key: &str) -> Result<bool, CacheStoreError> {
    self.store.delete(lock_key).await
  }

  pub async fn is_locked(&self, lock_key: &str) -> Result<bool, CacheStoreError> {
    Ok(!self.store.ttl(lock_key).await?.is_missing())
  }
}

/// A held lock. Release with [`LockGuard::release`]; a guard dropped without
/// release schedules the release on the current tokio runtime.
pub struct LockGuard {
  store: Arc<dyn CacheStore>,
  key: String,
  token: String,
  released: bool,
}

impl LockGuard {
  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn token(&self) -> &str {
    &self.token
  }

  /// Returns false if the lock had already expired or been taken over.
  pub async fn release(mut self) -> Result<bool, CacheStoreError> {
    self.released = true;
    let released = self.store.delete_if_equals(&self.key, &self.token).await?;
    if !released {
      tracing::warn!(lock_key = %self.key, "Lock expired before release");
    }
    Ok(released)
  }

  /// Release and log failures instead of returning them. Used on paths that
  /// already carry a result for the caller.
  pub async fn release_quietly(self) {
    let key = self.key.clone();
    if let Err(e) = self.release().await {
      tracing::warn!(lock_key = %key, "Failed to release lock: {}", e);
    }
  }
}

impl Drop for LockGuard {
  fn drop(&mut self) {
    if self.released {
      return;
    }

    let store = self.store.clone();
    let key = std::mem::take(&mut self.key);
    let token = std::mem::take(&mut self.token);
    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        handle.spawn(async move {
          if let Err(e) = store.delete_if_equals(&key, &token).await {
            tracing::warn!(lock_key = %key, "Failed to release dropped lock: {}", e);
          }
        });
      }
      Err(_) => {
        tracing::warn!(lock_key = %key, "Lock dropped outside a runtime, left to expire");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::InMemoryCacheStore;

  fn mutex() -> (Arc<InMemoryCacheStore>, DistributedMutex) {
    let store = Arc::new(InMemoryCacheStore::new());
    let mutex = DistributedMutex::new(store.clone(), DEFAULT_LOCK_TTL);
    (store, mutex)
  }

  #[tokio::test]
  async fn test_try_lock_is_exclusive() {
    let (_, mutex) = mutex();

    let guard = mutex.try_lock("lock:k").await.unwrap().unwrap();
    assert!(mutex.try_lock("lock:k").await.unwrap().is_none());
    assert!(mutex.is_locked("lock:k").await.unwrap());

    assert!(guard.release().await.unwrap());
    assert!(!mutex.is_locked("lock:k").await.unwrap());
    assert!(mutex.try_lock("lock:k").await.unwrap().is_some());
  }

  #[tokio::test]
  async fn test_release_does_not_steal_new_holder() {
    let (store, mutex) = mutex();

    let stale = mutex.try_lock("lock:k").await.unwrap().unwrap();
    // Simulate TTL expiry followed by another caller acquiring the lock.
    assert!(mutex.unlock("lock:k").await.unwrap());
    let fresh = mutex.try_lock("lock:k").await.unwrap().unwrap();

    assert!(!stale.release().await.unwrap());
    assert_eq!(store.get("lock:k").await.unwrap().as_deref(), Some(fresh.token()));
    assert!(fresh.release().await.unwrap());
  }

  #[tokio::test]
  async fn test_lock_expires() {
    let store = Arc::new(InMemoryCacheStore::new());
    let mutex = DistributedMutex::new(store, Duration::from_millis(20));

    let _held = mutex.try_lock("lock:k").await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(mutex.try_lock("lock:k").await.unwrap().is_some());
  }

  #[tokio::test]
  async fn test_dropped_guard_releases() {
    let (_, mutex) = mutex();

    {
      let _guard = mutex.try_lock("lock:k").await.unwrap().unwrap();
    }
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!mutex.is_locked("lock:k").await.unwrap());
  }
}
