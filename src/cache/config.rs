//! Store backend configuration

use serde::{Deserialize, Serialize};

/// Store mode: builtin in-memory or proxy to external Redis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
  /// In-memory store (default)
  #[default]
  Builtin,
  /// Proxy to external Redis server
  Proxy,
}

impl std::fmt::Display for CacheMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CacheMode::Builtin => write!(f, "builtin"),
      CacheMode::Proxy => write!(f, "proxy"),
    }
  }
}

impl std::str::FromStr for CacheMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "builtin" | "memory" | "inmemory" => Ok(CacheMode::Builtin),
      "proxy" | "external" | "redis" => Ok(CacheMode::Proxy),
      _ => Err(format!("Unknown cache mode: {}", s)),
    }
  }
}

/// Configuration for proxy mode (external Redis)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheProxyConfig {
  /// Redis host
  #[serde(default = "default_host")]
  pub host: String,

  /// Redis port
  #[serde(default = "default_redis_port")]
  pub port: u16,

  /// Redis password (optional)
  #[serde(default)]
  pub password: Option<String>,

  /// Redis database number
  #[serde(default)]
  pub database: u8,

  /// Enable TLS
  #[serde(default)]
  pub tls_enabled: bool,
}

fn default_host() -> String {
  "localhost".to_string()
}

fn default_redis_port() -> u16 {
  6379
}

impl Default for CacheProxyConfig {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_redis_port(),
      password: None,
      database: 0,
      tls_enabled: false,
    }
  }
}

impl CacheProxyConfig {
  pub fn is_configured(&self) -> bool {
    !self.host.is_empty()
  }

  /// Generate Redis connection URL
  pub fn connection_url(&self) -> String {
    let scheme = if self.tls_enabled { "rediss" } else { "redis" };
    let auth = match &self.password {
      Some(pwd) if !pwd.is_empty() => format!(":{}@", pwd),
      _ => String::new(),
    };
    format!(
      "{}://{}{}:{}/{}",
      scheme, auth, self.host, self.port, self.database
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cache_mode_parse() {
    assert_eq!("builtin".parse::<CacheMode>().unwrap(), CacheMode::Builtin);
    assert_eq!("Memory".parse::<CacheMode>().unwrap(), CacheMode::Builtin);
    assert_eq!("redis".parse::<CacheMode>().unwrap(), CacheMode::Proxy);
    assert!("memcached".parse::<CacheMode>().is_err());
  }

  #[test]
  fn test_connection_url() {
    let mut config = CacheProxyConfig::default();
    assert_eq!(config.connection_url(), "redis://localhost:6379/0");

    config.password = Some("secret".to_string());
    config.tls_enabled = true;
    config.database = 3;
    assert_eq!(config.connection_url(), "rediss://:secret@localhost:6379/3");

    config.password = Some(String::new());
    assert_eq!(config.connection_url(), "rediss://localhost:6379/3");
  }
}
