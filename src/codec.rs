//! Value encoding and the logical-expiry envelope

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::time::Duration;

/// Codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
  #[error("ttl out of range: {0:?}")]
  TtlOutOfRange(Duration),
}

/// Encodes values of one shape to the string form kept in the store.
///
/// Implementations must be deterministic and `decode(encode(v)) == v` for
/// every value they accept.
pub trait Codec<V>: Send + Sync {
  fn encode(&self, value: &V) -> Result<String, CodecError>;
  fn decode(&self, raw: &str) -> Result<V, CodecError>;
}

/// JSON codec for any serde value
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<V> Codec<V> for JsonCodec
where
  V: Serialize + DeserializeOwned,
{
  fn encode(&self, value: &V) -> Result<String, CodecError> {
    Ok(serde_json::to_string(value)?)
  }

  fn decode(&self, raw: &str) -> Result<V, CodecError> {
    Ok(serde_json::from_str(raw)?)
  }
}

/// Stored form of a logically expiring value.
///
/// `data` is the inner codec's output, so the envelope stays independent of the
/// value shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
  pub data: String,
  pub logical_expire_at: DateTime<Utc>,
}

impl Envelope {
  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    self.logical_expire_at <= now
  }
}

/// Wraps a value codec with an envelope
pub struct EnvelopeCodec<'a, V, C> {
  inner: &'a C,
  _value: PhantomData<fn() -> V>,
}

impl<'a, V, C: Codec<V>> EnvelopeCodec<'a, V, C> {
  pub fn new(inner: &'a C) -> Self {
    Self {
      inner,
      _value: PhantomData,
    }
  }

  /// Encode with `logicalExpireAt = now + ttl`
  pub fn encode(&self, value: &V, ttl: Duration) -> Result<String, CodecError> {
    let ttl = chrono::Duration::from_std(ttl).map_err(|_| CodecError::TtlOutOfRange(ttl))?;
    self.encode_until(value, Utc::now() + ttl)
  }

  pub fn encode_until(
    &self,
    value: &V,
    logical_expire_at: DateTime<Utc>,
  ) -> Result<String, CodecError> {
    let envelope = Envelope {
      data: self.inner.encode(value)?,
      logical_expire_at,
    };
    Ok(serde_json::to_string(&envelope)?)
  }

  pub fn decode(&self, raw: &str) -> Result<(V, DateTime<Utc>), CodecError> {
    let envelope: Envelope = serde_json::from_str(raw)?;
    let value = self.inner.decode(&envelope.data)?;
    Ok((value, envelope.logical_expire_at))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Shop {
    id: u64,
    name: String,
    tags: Vec<String>,
    score: Option<f64>,
  }

  fn shop() -> Shop {
    Shop {
      id: 1,
      name: "Acme".to_string(),
      tags: vec!["tea".to_string(), "cake".to_string()],
      score: Some(4.5),
    }
  }

  #[test]
  fn test_json_roundtrip() {
    let raw = Codec::<Shop>::encode(&JsonCodec, &shop()).unwrap();
    let decoded: Shop = JsonCodec.decode(&raw).unwrap();
    assert_eq!(decoded, shop());
  }

  #[test]
  fn test_json_roundtrip_collection() {
    let shops = vec![shop(), Shop { id: 2, ..shop() }];
    let raw = JsonCodec.encode(&shops).unwrap();
    let decoded: Vec<Shop> = JsonCodec.decode(&raw).unwrap();
    assert_eq!(decoded, shops);
  }

  #[test]
  fn test_encoded_value_is_never_negative_marker() {
    let raw = JsonCodec.encode(&String::new()).unwrap();
    assert_eq!(raw, "\"\"");
  }

  #[test]
  fn test_envelope_roundtrip() {
    let codec = EnvelopeCodec::<Shop, _>::new(&JsonCodec);
    let before = Utc::now();
    let raw = codec.encode(&shop(), Duration::from_secs(20)).unwrap();
    let (decoded, expire_at) = codec.decode(&raw).unwrap();

    assert_eq!(decoded, shop());
    assert!(expire_at >= before + chrono::Duration::seconds(20));
    assert!(expire_at <= Utc::now() + chrono::Duration::seconds(20));
  }

  #[test]
  fn test_envelope_wire_format() {
    let codec = EnvelopeCodec::<u32, _>::new(&JsonCodec);
    let at = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
      .unwrap()
      .with_timezone(&Utc);
    let raw = codec.encode_until(&7, at).unwrap();

    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["data"], "7");
    assert!(json["logicalExpireAt"].as_str().unwrap().starts_with("2024-01-01T00:00:00"));
  }

  #[test]
  fn test_envelope_expiry() {
    let now = Utc::now();
    let envelope = Envelope {
      data: "1".to_string(),
      logical_expire_at: now,
    };
    assert!(envelope.is_expired_at(now));
    assert!(!envelope.is_expired_at(now - chrono::Duration::seconds(1)));
  }

  #[test]
  fn test_decode_garbage_fails() {
    let codec = EnvelopeCodec::<Shop, _>::new(&JsonCodec);
    assert!(codec.decode("not json").is_err());
    assert!(Codec::<Shop>::decode(&JsonCodec, "{\"id\":1}").is_err());
  }
}
