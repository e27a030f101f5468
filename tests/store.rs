//! In-memory store tests

use cache_aside::cache::{CacheStore, InMemoryCacheStore, KeyTtl};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_store_set_get() {
  let store = InMemoryCacheStore::new();

  store.set("key1", "value1", None).await.unwrap();
  assert_eq!(store.get("key1").await.unwrap().as_deref(), Some("value1"));
  assert_eq!(store.get("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_store_empty_string_is_a_value() {
  let store = InMemoryCacheStore::new();

  store.set("negative", "", Some(Duration::from_secs(60))).await.unwrap();
  assert_eq!(store.get("negative").await.unwrap().as_deref(), Some(""));
}

#[tokio::test]
async fn test_store_set_overwrites_value_and_ttl() {
  let store = InMemoryCacheStore::new();

  store
    .set("key1", "old", Some(Duration::from_secs(10)))
    .await
    .unwrap();
  store.set("key1", "new", None).await.unwrap();

  assert_eq!(store.get("key1").await.unwrap().as_deref(), Some("new"));
  assert_eq!(store.ttl("key1").await.unwrap(), KeyTtl::Persistent);
}

#[tokio::test]
async fn test_store_ttl_expiry() {
  let store = InMemoryCacheStore::new();

  store
    .set("short", "v", Some(Duration::from_millis(20)))
    .await
    .unwrap();
  let ttl = store.ttl("short").await.unwrap();
  assert!(matches!(ttl, KeyTtl::Expires(d) if d <= Duration::from_millis(20)));

  tokio::time::sleep(Duration::from_millis(40)).await;
  assert_eq!(store.get("short").await.unwrap(), None);
  assert_eq!(store.ttl("short").await.unwrap(), KeyTtl::Missing);
}

#[tokio::test]
async fn test_store_set_if_absent() {
  let store = InMemoryCacheStore::new();

  assert!(store
    .set_if_absent("lock", "a", Duration::from_secs(10))
    .await
    .unwrap());
  assert!(!store
    .set_if_absent("lock", "b", Duration::from_secs(10))
    .await
    .unwrap());
  assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("a"));
}

#[tokio::test]
async fn test_store_set_if_absent_after_expiry() {
  let store = InMemoryCacheStore::new();

  assert!(store
    .set_if_absent("lock", "a", Duration::from_millis(10))
    .await
    .unwrap());
  tokio::time::sleep(Duration::from_millis(30)).await;
  assert!(store
    .set_if_absent("lock", "b", Duration::from_secs(10))
    .await
    .unwrap());
  assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("b"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_store_set_if_absent_single_winner() {
  let store = Arc::new(InMemoryCacheStore::new());

  let handles: Vec<_> = (0..32)
    .map(|i| {
      let store = store.clone();
      tokio::spawn(async move {
        store
          .set_if_absent("lock", &i.to_string(), Duration::from_secs(10))
          .await
          .unwrap()
      })
    })
    .collect();

  let mut winners = 0;
  for handle in handles {
    if handle.await.unwrap() {
      winners += 1;
    }
  }
  assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_store_delete_idempotent() {
  let store = InMemoryCacheStore::new();

  store.set("key1", "v", None).await.unwrap();
  assert!(store.delete("key1").await.unwrap());
  assert!(!store.delete("key1").await.unwrap());
  assert_eq!(store.get("key1").await.unwrap(), None);
}

#[tokio::test]
async fn test_store_delete_if_equals() {
  let store = InMemoryCacheStore::new();

  store.set("lock", "token-a", None).await.unwrap();
  assert!(!store.delete_if_equals("lock", "token-b").await.unwrap());
  assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("token-a"));

  assert!(store.delete_if_equals("lock", "token-a").await.unwrap());
  assert_eq!(store.get("lock").await.unwrap(), None);
  assert!(!store.delete_if_equals("lock", "token-a").await.unwrap());
}

#[tokio::test]
async fn test_store_stats_and_sweep() {
  let store = InMemoryCacheStore::new();

  store.set("a", "1", None).await.unwrap();
  store
    .set("b", "2", Some(Duration::from_millis(10)))
    .await
    .unwrap();
  store.get("a").await.unwrap();
  store.get("zzz").await.unwrap();

  tokio::time::sleep(Duration::from_millis(30)).await;
  assert_eq!(store.evict_expired(), 1);

  let stats = store.stats();
  assert_eq!(stats.keys, 1);
  assert_eq!(stats.hits, 1);
  assert_eq!(stats.misses, 1);
  assert_eq!(stats.expired, 1);
  assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
}
