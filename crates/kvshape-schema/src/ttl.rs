use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kvshape_store::Batch;

/// Expiry applied to every physical key of a field.
///
/// In TOML this reads as `ttl = { expire = 60 }` or
/// `ttl = { expire_at = 1700000000 }`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ttl {
    /// Relative expiry in seconds from the moment the batch is applied.
    Expire(i64),
    /// Absolute expiry as a Unix timestamp in seconds.
    ExpireAt(i64),
}

impl Ttl {
    /// Expire `seconds` after the write.
    pub fn seconds(seconds: i64) -> Self {
        Self::Expire(seconds)
    }

    /// Expire at a Unix timestamp.
    pub fn at(timestamp: i64) -> Self {
        Self::ExpireAt(timestamp)
    }

    /// Expire at a wall-clock instant (truncated to whole seconds).
    pub fn at_datetime(when: DateTime<Utc>) -> Self {
        Self::ExpireAt(when.timestamp())
    }

    /// Queue the expiry directive for `key`.
    pub fn apply(&self, key: &str, batch: &mut Batch) {
        match *self {
            Self::Expire(seconds) => batch.expire(key, seconds),
            Self::ExpireAt(timestamp) => batch.expire_at(key, timestamp),
        };
    }
}
