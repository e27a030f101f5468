//! Demo for the cache layer.
//!
//! Resolves shops through the configured query strategy, then updates one
//! through the write path and caches the shop-type list without a TTL.

use anyhow::Context;
use cache_aside::{CacheClient, CacheLayerConfig, QueryStrategy};
use clap::Parser;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const CACHE_SHOP_KEY: &str = "cache:shop:";
const CACHE_SHOP_TYPE_KEY: &str = "cache:shop-type";

#[derive(Parser)]
#[command(
  name = "cache-demo",
  about = "Exercise the cache-aside strategies against an in-process table",
  version
)]
struct Args {
  #[arg(short, long)]
  config: Option<String>,
  #[arg(long, env = "CACHE_ASIDE_STRATEGY", default_value = "pass_through")]
  strategy: QueryStrategy,
  /// Shop id to query
  #[arg(long, default_value_t = 1)]
  id: u64,
  /// Simulated source latency in milliseconds
  #[arg(long, default_value_t = 50)]
  latency_ms: u64,
  #[arg(long)]
  log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Shop {
  id: u64,
  name: String,
  type_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ShopType {
  id: u64,
  name: String,
  sort: u32,
}

/// Stand-in for the database the cache protects
#[derive(Clone)]
struct ShopTable {
  rows: Arc<RwLock<HashMap<u64, Shop>>>,
  latency: Duration,
}

impl ShopTable {
  fn seeded(latency: Duration) -> Self {
    let rows = (1..=3)
      .map(|id| {
        (
          id,
          Shop {
            id,
            name: format!("Shop {}", id),
            type_id: 1,
          },
        )
      })
      .collect();
    Self {
      rows: Arc::new(RwLock::new(rows)),
      latency,
    }
  }

  async fn get_by_id(&self, id: u64) -> anyhow::Result<Option<Shop>> {
    tokio::time::sleep(self.latency).await;
    Ok(self.rows.read().get(&id).cloned())
  }

  async fn rename(&self, id: u64, name: &str) -> anyhow::Result<()> {
    tokio::time::sleep(self.latency).await;
    let mut rows = self.rows.write();
    let shop = rows.get_mut(&id).context("shop not found")?;
    shop.name = name.to_string();
    Ok(())
  }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
  let args = Args::parse();

  // Load config: explicit path > auto-detect > defaults
  let mut config = if let Some(path) = &args.config {
    CacheLayerConfig::from_file(path)?
  } else {
    CacheLayerConfig::find_and_load()?.unwrap_or_default()
  };
  if let Some(level) = args.log_level {
    config.logging.level = level;
  }
  cache_aside::telemetry::init_tracing(&config.logging);

  let client = CacheClient::from_config(&config).await?;
  let table = ShopTable::seeded(Duration::from_millis(args.latency_ms));
  let ttl = match args.strategy {
    QueryStrategy::LogicalExpire => client.policy().logical_ttl,
    _ => client.policy().positive_ttl,
  };

  if args.strategy == QueryStrategy::LogicalExpire {
    for id in 1..=3u64 {
      let t = table.clone();
      client
        .preload(CACHE_SHOP_KEY, id, move |id| async move { t.get_by_id(id).await }, ttl)
        .await?;
    }
  }

  for round in 1..=2 {
    for id in [args.id, 404] {
      let t = table.clone();
      let shop: Option<Shop> = client
        .query(
          args.strategy,
          CACHE_SHOP_KEY,
          id,
          move |id| async move { t.get_by_id(id).await },
          ttl,
        )
        .await?;
      tracing::info!(round, id, strategy = %args.strategy, "Resolved {:?}", shop);
    }
  }

  let t = table.clone();
  client
    .update_and_invalidate(CACHE_SHOP_KEY, args.id, move |id| async move {
      t.rename(id, "Renamed shop").await
    })
    .await?;

  let types = vec![
    ShopType {
      id: 1,
      name: "Food".into(),
      sort: 1,
    },
    ShopType {
      id: 2,
      name: "KTV".into(),
      sort: 2,
    },
  ];
  client.set(CACHE_SHOP_TYPE_KEY, &types, None).await?;
  let cached: Vec<ShopType> = match client.lookup(CACHE_SHOP_TYPE_KEY).await? {
    cache_aside::Lookup::Value(types) => types,
    _ => Vec::new(),
  };
  tracing::info!("Cached {} shop types", cached.len());

  client.scheduler().shutdown().await;
  Ok(())
}
