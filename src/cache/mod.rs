//! Key-value store abstraction the cache layer sits on
//!
//! Provides:
//! - The `CacheStore` operation set (get, set with TTL, atomic set-if-absent, delete)
//! - An in-process store with lazy and periodic expiry
//! - A Redis proxy store (feature `proxy`)

pub mod config;
mod entry;
#[cfg(feature = "proxy")]
pub mod proxy;
mod store;

pub use config::{CacheMode, CacheProxyConfig};
pub use entry::{CacheEntry, KeyTtl};
#[cfg(feature = "proxy")]
pub use proxy::RedisCacheStore;
pub use store::{run_expiration_task, CacheStats, CacheStore, CacheStoreError, InMemoryCacheStore};
