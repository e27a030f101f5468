//! Key namespace conventions
//!
//! Data keys are `<prefix><id>`, lock keys are `lock:<prefix><id>`.

use std::fmt::Display;

pub const LOCK_KEY_PREFIX: &str = "lock:";

/// Value stored to remember that the source of truth has no record
pub const NEGATIVE_MARKER: &str = "";

pub fn data_key(prefix: &str, id: impl Display) -> String {
  format!("{}{}", prefix, id)
}

/// Lock key guarding rebuilds of `data_key`
pub fn lock_key(data_key: &str) -> String {
  format!("{}{}", LOCK_KEY_PREFIX, data_key)
}
