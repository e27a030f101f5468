//! Cache entry types

use std::time::{Duration, Instant};

/// A stored value with its expiry metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub value: String,
  pub expires_at: Option<Instant>,
}

impl CacheEntry {
  pub fn new(value: String, ttl: Option<Duration>) -> Self {
    let now = Instant::now();
    Self {
      value,
      expires_at: ttl.map(|d| now + d),
    }
  }

  pub fn is_expired(&self) -> bool {
    self
      .expires_at
      .map(|exp| Instant::now() >= exp)
      .unwrap_or(false)
  }

  pub fn ttl_remaining(&self) -> Option<Duration> {
    self.expires_at.and_then(|exp| {
      let now = Instant::now();
      if now >= exp {
        None
      } else {
        Some(exp - now)
      }
    })
  }
}

/// Remaining lifetime of a key as reported by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
  /// Key does not exist (or already expired)
  Missing,
  /// Key exists without a store-level expiry
  Persistent,
  /// Key expires after the given duration
  Expires(Duration),
}

impl KeyTtl {
  pub fn is_missing(&self) -> bool {
    matches!(self, KeyTtl::Missing)
  }

  pub fn remaining(&self) -> Option<Duration> {
    match self {
      KeyTtl::Expires(d) => Some(*d),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_entry_without_ttl_never_expires() {
    let entry = CacheEntry::new("v".to_string(), None);
    assert!(!entry.is_expired());
    assert_eq!(entry.ttl_remaining(), None);
  }

  #[test]
  fn test_entry_zero_ttl_is_expired() {
    let entry = CacheEntry::new("v".to_string(), Some(Duration::ZERO));
    assert!(entry.is_expired());
  }

  #[test]
  fn test_key_ttl_remaining() {
    assert_eq!(KeyTtl::Missing.remaining(), None);
    assert_eq!(KeyTtl::Persistent.remaining(), None);
    assert_eq!(
      KeyTtl::Expires(Duration::from_secs(5)).remaining(),
      Some(Duration::from_secs(5))
    );
    assert!(KeyTtl::Missing.is_missing());
  }
}
