use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use super::{load_bounded, Lookup};
use crate::client::CacheClient;
use crate::codec::Codec;
use crate::error::{CacheError, Result};
use crate::keys::{data_key, lock_key};

impl<C> CacheClient<C> {
  /// Cache-aside read where only the lock holder loads a missing key.
  ///
  /// Callers that lose the race sleep for the retry interval and read again
  /// until the holder has filled the key. Waiting is bounded by both the
  /// attempt count and the total wait; past either bound the call fails with
  /// [`CacheError::LockTimeout`].
  pub async fn query_with_mutex<V, I, L, Fut>(
    &self,
    key_prefix: &str,
    id: I,
    loader: L,
    ttl: Duration,
  ) -> Result<Option<V>>
  where
    C: Codec<V>,
    I: Display,
    L: FnOnce(I) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<V>>>,
  {
    self.check_ttl(ttl)?;
    let key = data_key(key_prefix, &id);
    let lock_key = lock_key(&key);
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
      match self.lookup(&key).await? {
        Lookup::Value(value) => return Ok(Some(value)),
        Lookup::Negative => return Ok(None),
        Lookup::Absent => {}
      }

      attempts += 1;
      if let Some(guard) = self.mutex.try_lock(&lock_key).await? {
        let result = self.load_locked(&key, id, loader, ttl).await;
        guard.release_quietly().await;
        return result;
      }

      let waited = started.elapsed();
      if attempts >= self.policy.max_lock_attempts
        || waited + self.policy.retry_interval > self.policy.max_lock_wait
      {
        tracing::warn!(key = %key, attempts, "Gave up waiting for rebuild lock");
        return Err(CacheError::LockTimeout {
          key,
          attempts,
          waited,
        });
      }
      tokio::time::sleep(self.policy.retry_interval).await;
    }
  }

  async fn load_locked<V, I, L, Fut>(
    &self,
    key: &str,
    id: I,
    loader: L,
    ttl: Duration,
  ) -> Result<Option<V>>
  where
    C: Codec<V>,
    L: FnOnce(I) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<V>>>,
  {
    // The previous holder may have filled the key between our miss and our
    // acquire.
    match self.lookup(key).await? {
      Lookup::Value(value) => return Ok(Some(value)),
      Lookup::Negative => return Ok(None),
      Lookup::Absent => {}
    }

    tracing::info!(key, "Rebuilding under lock");
    let loaded = load_bounded(key, self.policy.loader_timeout, loader(id)).await?;
    self.fill(key, loaded, ttl).await
  }
}
