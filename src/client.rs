//! Cache client: assembly, plain writes, warmup and write-path invalidation.
//!
//! The query strategies live in [`crate::strategy`] as further `impl` blocks on
//! [`CacheClient`].

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{run_expiration_task, CacheMode, CacheStore, InMemoryCacheStore};
use crate::codec::{Codec, EnvelopeCodec, JsonCodec};
use crate::config::{CacheLayerConfig, CachePolicy};
use crate::error::{CacheError, Result};
use crate::keys::data_key;
use crate::lock::DistributedMutex;
use crate::scheduler::RebuildScheduler;

pub struct CacheClient<C = JsonCodec> {
  pub(crate) store: Arc<dyn CacheStore>,
  pub(crate) codec: C,
  pub(crate) mutex: DistributedMutex,
  pub(crate) scheduler: Arc<RebuildScheduler>,
  pub(crate) policy: CachePolicy,
}

impl CacheClient<JsonCodec> {
  pub fn new(
    store: Arc<dyn CacheStore>,
    scheduler: Arc<RebuildScheduler>,
    policy: CachePolicy,
  ) -> Self {
    Self::with_codec(store, scheduler, policy, JsonCodec)
  }

  /// Validate `config`, connect the configured store and start the rebuild
  /// workers. Must be called inside a tokio runtime.
  pub async fn from_config(config: &CacheLayerConfig) -> Result<Self> {
    config.validate()?;

    let store: Arc<dyn CacheStore> = match config.store.mode {
      CacheMode::Builtin => {
        let store = Arc::new(InMemoryCacheStore::new());
        if config.store.sweep_interval_secs > 0 {
          tokio::spawn(run_expiration_task(
            store.clone(),
            Duration::from_secs(config.store.sweep_interval_secs),
          ));
        }
        store
      }
      #[cfg(feature = "proxy")]
      CacheMode::Proxy => {
        let store = crate::cache::RedisCacheStore::new(config.store.proxy.clone())
          .await
          .map_err(|e| CacheError::StoreUnavailable(e.to_string()))?;
        Arc::new(store)
      }
      #[cfg(not(feature = "proxy"))]
      CacheMode::Proxy => {
        return Err(CacheError::Config(
          "proxy mode requires the `proxy` feature".into(),
        ))
      }
    };

    let scheduler = Arc::new(RebuildScheduler::new(config.rebuild.workers));
    tracing::info!("Cache layer ready (store mode: {})", config.store.mode);
    Ok(Self::new(store, scheduler, CachePolicy::from(config)))
  }
}

impl<C> CacheClient<C> {
  pub fn with_codec(
    store: Arc<dyn CacheStore>,
    scheduler: Arc<RebuildScheduler>,
    policy: CachePolicy,
    codec: C,
  ) -> Self {
    let mutex = DistributedMutex::new(store.clone(), policy.lock_ttl);
    Self {
      store,
      codec,
      mutex,
      scheduler,
      policy,
    }
  }

  pub fn store(&self) -> &Arc<dyn CacheStore> {
    &self.store
  }

  pub fn scheduler(&self) -> &Arc<RebuildScheduler> {
    &self.scheduler
  }

  pub fn mutex(&self) -> &DistributedMutex {
    &self.mutex
  }

  pub fn policy(&self) -> &CachePolicy {
    &self.policy
  }

  /// Encode and store a plain value. `ttl = None` keeps it until invalidated.
  pub async fn set<V>(&self, key: &str, value: &V, ttl: Option<Duration>) -> Result<()>
  where
    C: Codec<V>,
  {
    let raw = self.codec.encode(value).map_err(|source| CacheError::Encode {
      key: key.to_string(),
      source,
    })?;
    self.store.set(key, &raw, ttl).await?;
    Ok(())
  }

  /// Store `value` in an envelope that logically expires after `ttl`. The key
  /// itself has no store TTL.
  pub async fn set_with_logical_expire<V>(&self, key: &str, value: &V, ttl: Duration) -> Result<()>
  where
    C: Codec<V>,
  {
    let raw = EnvelopeCodec::new(&self.codec)
      .encode(value, ttl)
      .map_err(|source| CacheError::Encode {
        key: key.to_string(),
        source,
      })?;
    self.store.set(key, &raw, None).await?;
    Ok(())
  }

  /// Pre-populate a key for logical-expiration queries.
  pub async fn warm<V>(
    &self,
    key_prefix: &str,
    id: impl Display,
    value: &V,
    ttl: Duration,
  ) -> Result<()>
  where
    C: Codec<V>,
  {
    let key = data_key(key_prefix, id);
    self.set_with_logical_expire(&key, value, ttl).await?;
    tracing::info!(key = %key, "Warmed");
    Ok(())
  }

  /// Load from the source and warm the key. Returns false, writing nothing,
  /// when the source has no record.
  pub async fn preload<V, I, L, Fut>(
    &self,
    key_prefix: &str,
    id: I,
    loader: L,
    ttl: Duration,
  ) -> Result<bool>
  where
    C: Codec<V>,
    I: Display,
    L: FnOnce(I) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<V>>>,
  {
    let key = data_key(key_prefix, &id);
    match loader(id).await.map_err(|e| CacheError::loader(&key, e))? {
      Some(value) => {
        self.set_with_logical_expire(&key, &value, ttl).await?;
        tracing::info!(key = %key, "Preloaded");
        Ok(true)
      }
      None => {
        tracing::debug!(key = %key, "Nothing to preload");
        Ok(false)
      }
    }
  }

  /// Drop the cached value (or negative marker) for `id`.
  pub async fn invalidate(&self, key_prefix: &str, id: impl Display) -> Result<bool> {
    let key = data_key(key_prefix, id);
    let removed = self.store.delete(&key).await?;
    tracing::info!(key = %key, removed, "Invalidated");
    Ok(removed)
  }

  /// Write to the source of truth first, then invalidate. A failed write
  /// leaves the cache untouched.
  pub async fn update_and_invalidate<T, I, W, Fut>(
    &self,
    key_prefix: &str,
    id: I,
    writer: W,
  ) -> Result<T>
  where
    I: Display,
    W: FnOnce(I) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
  {
    let key = data_key(key_prefix, &id);
    let out = writer(id).await.map_err(|e| CacheError::writer(&key, e))?;
    self.store.delete(&key).await?;
    tracing::info!(key = %key, "Source updated, cache invalidated");
    Ok(out)
  }
}
