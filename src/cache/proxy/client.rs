//! Redis-backed store for deployments that share the cache across processes

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::time::Duration;

use crate::cache::config::CacheProxyConfig;
use crate::cache::entry::KeyTtl;
use crate::cache::store::{CacheStore, CacheStoreError};

/// Deletes KEYS[1] only while it still holds ARGV[1].
const DELETE_IF_EQUALS_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Store that forwards every operation to an external Redis server
pub struct RedisCacheStore {
  connection: ConnectionManager,
  config: CacheProxyConfig,
}

impl RedisCacheStore {
  /// Create a new Redis store from configuration
  pub async fn new(config: CacheProxyConfig) -> Result<Self, RedisError> {
    let url = config.connection_url();
    let client = Client::open(url)?;
    let connection = ConnectionManager::new(client).await?;

    tracing::info!("Connected to Redis at {}:{}", config.host, config.port);
    Ok(Self { connection, config })
  }

  pub fn config(&self) -> &CacheProxyConfig {
    &self.config
  }

  /// Test the connection to Redis
  pub async fn test_connection(&self) -> Result<(), RedisError> {
    let mut conn = self.connection.clone();
    redis::cmd("PING").query_async::<()>(&mut conn).await?;
    Ok(())
  }
}

fn unavailable(e: RedisError) -> CacheStoreError {
  CacheStoreError::Unavailable(e.to_string())
}

/// Redis rejects PX 0, so sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> u64 {
  (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
  async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
    let mut conn = self.connection.clone();
    conn.get(key).await.map_err(unavailable)
  }

  async fn set(
    &self,
    key: &str,
    value: &str,
    ttl: Option<Duration>,
  ) -> Result<(), CacheStoreError> {
    let mut conn = self.connection.clone();
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    if let Some(ttl) = ttl {
      cmd.arg("PX").arg(ttl_millis(ttl));
    }
    cmd.query_async::<()>(&mut conn).await.map_err(unavailable)
  }

  async fn set_if_absent(
    &self,
    key: &str,
    value: &str,
    ttl: Duration,
  ) -> Result<bool, CacheStoreError> {
    let mut conn = self.connection.clone();
    let reply: Option<String> = redis::cmd("SET")
      .arg(key)
      .arg(value)
      .arg("NX")
      .arg("PX")
      .arg(ttl_millis(ttl))
      .query_async(&mut conn)
      .await
      .map_err(unavailable)?;
    Ok(reply.is_some())
  }

  async fn delete(&self, key: &str) -> Result<bool, CacheStoreError> {
    let mut conn = self.connection.clone();
    let removed: i64 = conn.del(key).await.map_err(unavailable)?;
    Ok(removed > 0)
  }

  async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, CacheStoreError> {
    let mut conn = self.connection.clone();
    let removed: i64 = redis::Script::new(DELETE_IF_EQUALS_SCRIPT)
      .key(key)
      .arg(expected)
      .invoke_async(&mut conn)
      .await
      .map_err(unavailable)?;
    Ok(removed > 0)
  }

  async fn ttl(&self, key: &str) -> Result<KeyTtl, CacheStoreError> {
    let mut conn = self.connection.clone();
    let millis: i64 = conn.pttl(key).await.map_err(unavailable)?;
    Ok(match millis {
      -2 => KeyTtl::Missing,
      -1 => KeyTtl::Persistent,
      ms => KeyTtl::Expires(Duration::from_millis(ms.max(0) as u64)),
    })
  }
}
