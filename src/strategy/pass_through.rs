use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use super::Lookup;
use crate::client::CacheClient;
use crate::codec::Codec;
use crate::error::{CacheError, Result};
use crate::keys::data_key;

impl<C> CacheClient<C> {
  /// Cache-aside read with negative caching.
  ///
  /// A miss calls `loader` and caches its answer: the value for `ttl`, or a
  /// negative marker for the configured negative TTL so that repeated lookups
  /// of a missing record stop reaching the source. Concurrent misses may each
  /// call the loader.
  pub async fn query_with_pass_through<V, I, L, Fut>(
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

    match self.lookup(&key).await? {
      Lookup::Value(value) => return Ok(Some(value)),
      Lookup::Negative => return Ok(None),
      Lookup::Absent => {}
    }

    let loaded = loader(id).await.map_err(|e| CacheError::loader(&key, e))?;
    self.fill(&key, loaded, ttl).await
  }
}
