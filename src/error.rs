//! Error kinds surfaced by the cache layer

use std::time::Duration;

use crate::cache::CacheStoreError;
use crate::codec::CodecError;

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

/// Errors returned by cache queries, warmup and the write path.
///
/// Store failures are never turned into cache misses: a query that cannot
/// reach the store fails with `StoreUnavailable` and the loader is not called.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  #[error("cache store unavailable: {0}")]
  StoreUnavailable(String),

  #[error("failed to decode cached value for {key}: {source}")]
  Decode {
    key: String,
    #[source]
    source: CodecError,
  },

  #[error("failed to encode value for {key}: {source}")]
  Encode {
    key: String,
    #[source]
    source: CodecError,
  },

  #[error("lock for {key} not acquired after {attempts} attempts ({waited:?})")]
  LockTimeout {
    key: String,
    attempts: u32,
    waited: Duration,
  },

  #[error("loader failed for {key}: {source}")]
  Loader {
    key: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
  },

  #[error("source update failed for {key}: {source}")]
  Writer {
    key: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
  },

  #[error("loader for {key} did not finish within {timeout:?}")]
  LoaderTimeout { key: String, timeout: Duration },

  #[error("ttl {ttl:?} must be longer than the negative-marker ttl {negative_ttl:?}")]
  InvalidTtl {
    ttl: Duration,
    negative_ttl: Duration,
  },

  #[error("rebuild scheduler is shut down")]
  SchedulerClosed,

  #[error("invalid configuration: {0}")]
  Config(String),
}

impl From<CacheStoreError> for CacheError {
  fn from(e: CacheStoreError) -> Self {
    match e {
      CacheStoreError::Unavailable(msg) => CacheError::StoreUnavailable(msg),
    }
  }
}

impl CacheError {
  pub(crate) fn loader(key: &str, e: anyhow::Error) -> Self {
    CacheError::Loader {
      key: key.to_string(),
      source: e.into(),
    }
  }

  pub(crate) fn writer(key: &str, e: anyhow::Error) -> Self {
    CacheError::Writer {
      key: key.to_string(),
      source: e.into(),
    }
  }

  pub fn is_store_unavailable(&self) -> bool {
    matches!(self, CacheError::StoreUnavailable(_))
  }

  pub fn is_lock_timeout(&self) -> bool {
    matches!(self, CacheError::LockTimeout { .. })
  }
}
