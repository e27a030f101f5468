use chrono::{DateTime, Utc};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use super::load_bounded;
use crate::cache::CacheStore;
use crate::client::CacheClient;
use crate::codec::{Codec, EnvelopeCodec};
use crate::error::{CacheError, Result};
use crate::keys::{data_key, lock_key};

impl<C> CacheClient<C> {
  /// Read a warmed key, serving stale values while one background job
  /// rebuilds it.
  ///
  /// Never calls `loader` on the caller's task and never waits for the
  /// rebuild. A key that was never warmed resolves to `None`; use
  /// [`CacheClient::warm`] or [`CacheClient::preload`] to populate it.
  pub async fn query_with_logical_expire<V, I, L, Fut>(
    &self,
    key_prefix: &str,
    id: I,
    loader: L,
    ttl: Duration,
  ) -> Result<Option<V>>
  where
    C: Codec<V> + Clone + 'static,
    V: Send + 'static,
    I: Display + Send + 'static,
    L: FnOnce(I) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Option<V>>> + Send + 'static,
  {
    let key = data_key(key_prefix, &id);
    let Some((value, expire_at)) = self.read_envelope(&key).await? else {
      tracing::debug!(key = %key, "Not warmed");
      return Ok(None);
    };
    if expire_at > Utc::now() {
      return Ok(Some(value));
    }

    let Some(guard) = self.mutex.try_lock(&lock_key(&key)).await? else {
      tracing::debug!(key = %key, "Rebuild in progress, serving stale value");
      return Ok(Some(value));
    };

    // A rebuild may have finished and released the lock between our read and
    // our acquire.
    match self.read_envelope(&key).await {
      Ok(Some((fresh, expire_at))) if expire_at > Utc::now() => {
        guard.release_quietly().await;
        tracing::debug!(key = %key, "Already rebuilt");
        return Ok(Some(fresh));
      }
      Ok(_) => {}
      Err(e) => {
        guard.release_quietly().await;
        return Err(e);
      }
    }

    let store = self.store.clone();
    let codec = self.codec.clone();
    let timeout = self.policy.loader_timeout;
    let job_key = key.clone();
    let submitted = self.scheduler.submit(async move {
      match refresh_envelope(&*store, &codec, &job_key, timeout, ttl, loader(id)).await {
        Ok(true) => tracing::info!(key = %job_key, "Rebuilt"),
        Ok(false) => {
          tracing::warn!(key = %job_key, "Source has no record, keeping stale value")
        }
        Err(e) => tracing::warn!(key = %job_key, "Rebuild failed: {}", e),
      }
      guard.release_quietly().await;
    });

    match submitted {
      Ok(()) => tracing::debug!(key = %key, "Rebuild scheduled"),
      // The dropped job drops its lock guard, which releases the lock.
      Err(e) => tracing::warn!(key = %key, "Could not schedule rebuild: {}", e),
    }
    Ok(Some(value))
  }

  /// Decoded envelope and its logical expiry; `None` if the key holds nothing.
  async fn read_envelope<V>(&self, key: &str) -> Result<Option<(V, DateTime<Utc>)>>
  where
    C: Codec<V>,
  {
    let raw = match self.store.get(key).await? {
      Some(raw) if !raw.is_empty() => raw,
      _ => return Ok(None),
    };
    let decoded = EnvelopeCodec::new(&self.codec)
      .decode(&raw)
      .map_err(|source| CacheError::Decode {
        key: key.to_string(),
        source,
      })?;
    Ok(Some(decoded))
  }
}

/// Load and rewrite the envelope. Returns false when the source has no
/// record; the previous envelope is left in place.
async fn refresh_envelope<V, C, Fut>(
  store: &dyn CacheStore,
  codec: &C,
  key: &str,
  timeout: Duration,
  ttl: Duration,
  load: Fut,
) -> Result<bool>
where
  C: Codec<V>,
  Fut: Future<Output = anyhow::Result<Option<V>>>,
{
  let Some(value) = load_bounded(key, timeout, load).await? else {
    return Ok(false);
  };

  let raw = EnvelopeCodec::new(codec)
    .encode(&value, ttl)
    .map_err(|source| CacheError::Encode {
      key: key.to_string(),
      source,
    })?;
  store.set(key, &raw, None).await?;
  Ok(true)
}
