//! Query strategies
//!
//! Three interchangeable ways to resolve a key through the cache:
//! - Pass-through: negative caching against penetration
//! - Mutex-guarded: one loader per key, other callers retry
//! - Logical expiration: stale reads plus background rebuild, never blocks

mod logical;
mod mutex;
mod pass_through;

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::client::CacheClient;
use crate::codec::Codec;
use crate::error::{CacheError, Result};
use crate::keys::NEGATIVE_MARKER;

/// What a plain (non-envelope) key currently holds
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
  Absent,
  /// The source of truth was confirmed to have no record
  Negative,
  Value(V),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStrategy {
  #[default]
  PassThrough,
  Mutex,
  LogicalExpire,
}

impl std::fmt::Display for QueryStrategy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      QueryStrategy::PassThrough => write!(f, "pass_through"),
      QueryStrategy::Mutex => write!(f, "mutex"),
      QueryStrategy::LogicalExpire => write!(f, "logical_expire"),
    }
  }
}

impl std::str::FromStr for QueryStrategy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().replace('-', "_").as_str() {
      "pass_through" | "passthrough" => Ok(QueryStrategy::PassThrough),
      "mutex" => Ok(QueryStrategy::Mutex),
      "logical_expire" | "logical" => Ok(QueryStrategy::LogicalExpire),
      _ => Err(format!("Unknown query strategy: {}", s)),
    }
  }
}

/// Run a loader future, bounded by `timeout`.
pub(crate) async fn load_bounded<V, Fut>(
  key: &str,
  timeout: Duration,
  load: Fut,
) -> Result<Option<V>>
where
  Fut: Future<Output = anyhow::Result<Option<V>>>,
{
  match tokio::time::timeout(timeout, load).await {
    Ok(Ok(loaded)) => Ok(loaded),
    Ok(Err(e)) => Err(CacheError::loader(key, e)),
    Err(_) => Err(CacheError::LoaderTimeout {
      key: key.to_string(),
      timeout,
    }),
  }
}

impl<C> CacheClient<C> {
  pub async fn lookup<V>(&self, key: &str) -> Result<Lookup<V>>
  where
    C: Codec<V>,
  {
    match self.store.get(key).await? {
      None => {
        tracing::debug!(key, "Cache miss");
        Ok(Lookup::Absent)
      }
      Some(raw) if raw == NEGATIVE_MARKER => {
        tracing::debug!(key, "Negative hit");
        Ok(Lookup::Negative)
      }
      Some(raw) => {
        let value = self.codec.decode(&raw).map_err(|source| CacheError::Decode {
          key: key.to_string(),
          source,
        })?;
        tracing::debug!(key, "Cache hit");
        Ok(Lookup::Value(value))
      }
    }
  }

  /// Write the loader's answer: the value with `ttl`, or a negative marker.
  pub(crate) async fn fill<V>(
    &self,
    key: &str,
    loaded: Option<V>,
    ttl: Duration,
  ) -> Result<Option<V>>
  where
    C: Codec<V>,
  {
    match loaded {
      Some(value) => {
        self.set(key, &value, Some(ttl)).await?;
        Ok(Some(value))
      }
      None => {
        self
          .store
          .set(key, NEGATIVE_MARKER, Some(self.policy.negative_ttl))
          .await?;
        tracing::debug!(key, "Recorded negative marker");
        Ok(None)
      }
    }
  }

  /// Negative markers must always expire before values.
  pub(crate) fn check_ttl(&self, ttl: Duration) -> Result<()> {
    if ttl <= self.policy.negative_ttl {
      return Err(CacheError::InvalidTtl {
        ttl,
        negative_ttl: self.policy.negative_ttl,
      });
    }
    Ok(())
  }

  /// Resolve through the given strategy.
  pub async fn query<V, I, L, Fut>(
    &self,
    strategy: QueryStrategy,
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
    match strategy {
      QueryStrategy::PassThrough => {
        self
          .query_with_pass_through(key_prefix, id, loader, ttl)
          .await
      }
      QueryStrategy::Mutex => self.query_with_mutex(key_prefix, id, loader, ttl).await,
      QueryStrategy::LogicalExpire => {
        self
          .query_with_logical_expire(key_prefix, id, loader, ttl)
          .await
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_strategy_parse() {
    assert_eq!(
      "pass-through".parse::<QueryStrategy>().unwrap(),
      QueryStrategy::PassThrough
    );
    assert_eq!("MUTEX".parse::<QueryStrategy>().unwrap(), QueryStrategy::Mutex);
    assert_eq!(
      "logical".parse::<QueryStrategy>().unwrap(),
      QueryStrategy::LogicalExpire
    );
    assert!("lru".parse::<QueryStrategy>().is_err());
  }

  #[test]
  fn test_strategy_display_roundtrip() {
    for strategy in [
      QueryStrategy::PassThrough,
      QueryStrategy::Mutex,
      QueryStrategy::LogicalExpire,
    ] {
      assert_eq!(strategy.to_string().parse::<QueryStrategy>().unwrap(), strategy);
    }
  }
}
