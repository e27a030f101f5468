//! Cache-aside layer over a key-value store.
//!
//! Resolves keys through one of three strategies that protect the source of
//! truth: negative caching against penetration, a store-backed mutex against
//! breakdown, and logical expiration with background rebuilds for hot keys.

pub mod cache;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod keys;
pub mod lock;
pub mod scheduler;
pub mod strategy;
pub mod telemetry;

pub use cache::{CacheStore, CacheStoreError, InMemoryCacheStore, KeyTtl};
pub use client::CacheClient;
pub use codec::{Codec, CodecError, Envelope, EnvelopeCodec, JsonCodec};
pub use config::{CacheLayerConfig, CachePolicy};
pub use error::{CacheError, Result};
pub use lock::{DistributedMutex, LockGuard};
pub use scheduler::RebuildScheduler;
pub use strategy::{Lookup, QueryStrategy};
