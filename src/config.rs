use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cache::{CacheMode, CacheProxyConfig};
use crate::error::CacheError;

/// Expand environment variables in a string.
/// Supports $VAR_NAME and ${VAR_NAME} syntax.
fn expand_env_vars(input: &str) -> String {
  let mut result = input.to_string();

  // Handle ${VAR_NAME} syntax first (more specific)
  while let Some(start) = result.find("${") {
    if let Some(end) = result[start..].find('}') {
      let var_name = &result[start + 2..start + end];
      let value = std::env::var(var_name).unwrap_or_default();
      result = format!(
        "{}{}{}",
        &result[..start],
        value,
        &result[start + end + 1..]
      );
    } else {
      break;
    }
  }

  // Then $VAR_NAME. Names are ASCII, so their byte and char lengths agree.
  let mut expanded = String::with_capacity(result.len());
  let mut chars = result.char_indices();
  while let Some((i, c)) = chars.next() {
    if c == '$' {
      let rest = &result[i + 1..];
      let var_len = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .count();
      if var_len > 0 {
        expanded.push_str(&std::env::var(&rest[..var_len]).unwrap_or_default());
        chars.nth(var_len - 1);
        continue;
      }
    }
    expanded.push(c);
  }

  expanded
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheLayerConfig {
  #[serde(default)]
  pub store: StoreSection,
  #[serde(default)]
  pub ttl: TtlSection,
  #[serde(default)]
  pub lock: LockSection,
  #[serde(default)]
  pub rebuild: RebuildSection,
  #[serde(default)]
  pub logging: LoggingSection,
}

/// Which key-value backend to use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
  #[serde(default)]
  pub mode: CacheMode,
  /// Used in proxy mode
  #[serde(default)]
  pub proxy: CacheProxyConfig,
  /// Expired-entry sweep interval for the builtin store (0 = lazy expiry only)
  #[serde(default = "default_sweep_interval_secs")]
  pub sweep_interval_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
  1
}

impl Default for StoreSection {
  fn default() -> Self {
    Self {
      mode: CacheMode::default(),
      proxy: CacheProxyConfig::default(),
      sweep_interval_secs: default_sweep_interval_secs(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlSection {
  /// Store TTL for cached values
  #[serde(default = "default_positive_secs")]
  pub positive_secs: u64,
  /// Store TTL for negative markers; must be shorter than `positive_secs`
  #[serde(default = "default_negative_secs")]
  pub negative_secs: u64,
  #[serde(default = "default_lock_secs")]
  pub lock_secs: u64,
  /// Logical lifetime written into envelopes
  #[serde(default = "default_logical_secs")]
  pub logical_secs: u64,
}

fn default_positive_secs() -> u64 {
  30 * 60
}
fn default_negative_secs() -> u64 {
  2 * 60
}
fn default_lock_secs() -> u64 {
  10
}
fn default_logical_secs() -> u64 {
  20
}

impl Default for TtlSection {
  fn default() -> Self {
    Self {
      positive_secs: default_positive_secs(),
      negative_secs: default_negative_secs(),
      lock_secs: default_lock_secs(),
      logical_secs: default_logical_secs(),
    }
  }
}

/// Retry bounds for mutex-guarded queries waiting on another rebuild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSection {
  #[serde(default = "default_retry_interval_ms")]
  pub retry_interval_ms: u64,
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_max_wait_ms")]
  pub max_wait_ms: u64,
}

fn default_retry_interval_ms() -> u64 {
  50
}
fn default_max_attempts() -> u32 {
  200
}
fn default_max_wait_ms() -> u64 {
  10_000
}

impl Default for LockSection {
  fn default() -> Self {
    Self {
      retry_interval_ms: default_retry_interval_ms(),
      max_attempts: default_max_attempts(),
      max_wait_ms: default_max_wait_ms(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildSection {
  #[serde(default = "default_workers")]
  pub workers: usize,
  /// Upper bound on a single loader call while a lock is held
  #[serde(default = "default_loader_timeout_ms")]
  pub loader_timeout_ms: u64,
}

fn default_workers() -> usize {
  crate::scheduler::DEFAULT_REBUILD_WORKERS
}
fn default_loader_timeout_ms() -> u64 {
  5_000
}

impl Default for RebuildSection {
  fn default() -> Self {
    Self {
      workers: default_workers(),
      loader_timeout_ms: default_loader_timeout_ms(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_level")]
  pub level: String,
}
fn default_level() -> String {
  "info".into()
}
impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_level(),
    }
  }
}

impl CacheLayerConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
    let content = std::fs::read_to_string(&path)?;
    Self::from_yaml(&content)
  }

  pub fn from_yaml(content: &str) -> Result<Self, anyhow::Error> {
    let expanded = expand_env_vars(content);
    Ok(serde_yaml::from_str(&expanded)?)
  }

  pub fn find_and_load() -> Result<Option<Self>, anyhow::Error> {
    for p in ["cache-aside.yaml", "cache-aside.yml"] {
      if Path::new(p).exists() {
        tracing::info!("Loading config from {}", p);
        return Ok(Some(Self::from_file(p)?));
      }
    }
    Ok(None)
  }

  pub fn validate(&self) -> Result<(), CacheError> {
    let ttl = &self.ttl;
    if ttl.positive_secs == 0 || ttl.negative_secs == 0 || ttl.lock_secs == 0 {
      return Err(CacheError::Config("ttl values must be non-zero".into()));
    }
    if ttl.logical_secs == 0 {
      return Err(CacheError::Config("ttl.logical_secs must be non-zero".into()));
    }
    if ttl.negative_secs >= ttl.positive_secs {
      return Err(CacheError::Config(format!(
        "ttl.negative_secs ({}) must be shorter than ttl.positive_secs ({})",
        ttl.negative_secs, ttl.positive_secs
      )));
    }
    if self.rebuild.workers == 0 {
      return Err(CacheError::Config("rebuild.workers must be at least 1".into()));
    }
    if self.rebuild.loader_timeout_ms >= ttl.lock_secs.saturating_mul(1000) {
      return Err(CacheError::Config(format!(
        "rebuild.loader_timeout_ms ({}) must be shorter than ttl.lock_secs ({}s)",
        self.rebuild.loader_timeout_ms, ttl.lock_secs
      )));
    }
    if self.lock.max_attempts == 0 {
      return Err(CacheError::Config("lock.max_attempts must be at least 1".into()));
    }
    if self.store.mode == CacheMode::Proxy && !self.store.proxy.is_configured() {
      return Err(CacheError::Config("store.proxy.host is required in proxy mode".into()));
    }
    Ok(())
  }
}

/// Runtime knobs the query strategies read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
  pub positive_ttl: Duration,
  pub negative_ttl: Duration,
  pub lock_ttl: Duration,
  pub logical_ttl: Duration,
  pub retry_interval: Duration,
  pub max_lock_attempts: u32,
  pub max_lock_wait: Duration,
  pub loader_timeout: Duration,
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self::from(&CacheLayerConfig::default())
  }
}

impl From<&CacheLayerConfig> for CachePolicy {
  fn from(config: &CacheLayerConfig) -> Self {
    Self {
      positive_ttl: Duration::from_secs(config.ttl.positive_secs),
      negative_ttl: Duration::from_secs(config.ttl.negative_secs),
      lock_ttl: Duration::from_secs(config.ttl.lock_secs),
      logical_ttl: Duration::from_secs(config.ttl.logical_secs),
      retry_interval: Duration::from_millis(config.lock.retry_interval_ms),
      max_lock_attempts: config.lock.max_attempts,
      max_lock_wait: Duration::from_millis(config.lock.max_wait_ms),
      loader_timeout: Duration::from_millis(config.rebuild.loader_timeout_ms),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_expand_env_vars() {
    std::env::set_var("CACHE_ASIDE_TEST_HOST", "redis.internal");
    assert_eq!(
      expand_env_vars("host: ${CACHE_ASIDE_TEST_HOST}"),
      "host: redis.internal"
    );
    assert_eq!(
      expand_env_vars("host: $CACHE_ASIDE_TEST_HOST:6379"),
      "host: redis.internal:6379"
    );
    assert_eq!(expand_env_vars("no vars"), "no vars");
  }

  #[test]
  fn test_expand_env_vars_non_ascii() {
    std::env::set_var("CACHE_ASIDE_TEST_CITY", "Zürich");
    assert_eq!(
      expand_env_vars("name: café $CACHE_ASIDE_TEST_CITY naïve ${CACHE_ASIDE_TEST_CITY}"),
      "name: café Zürich naïve Zürich"
    );
    assert_eq!(expand_env_vars("price: 5€ $"), "price: 5€ $");
  }

  #[test]
  fn test_default_policy() {
    let policy = CachePolicy::default();
    assert_eq!(policy.positive_ttl, Duration::from_secs(1800));
    assert_eq!(policy.negative_ttl, Duration::from_secs(120));
    assert_eq!(policy.lock_ttl, Duration::from_secs(10));
    assert_eq!(policy.retry_interval, Duration::from_millis(50));
    assert!(policy.negative_ttl < policy.positive_ttl);
    assert!(policy.loader_timeout < policy.lock_ttl);
  }

  #[test]
  fn test_default_config_is_valid() {
    assert!(CacheLayerConfig::default().validate().is_ok());
  }
}
