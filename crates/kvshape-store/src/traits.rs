use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::command::Batch;
use crate::error::StoreResult;

/// Async boundary to a Redis-like key-value store.
///
/// Implementations must satisfy these invariants:
/// - Reads of a missing key return the empty value for that type
///   (`None`, an empty map/list/set, `false`), never an error.
/// - Reading a key that holds a different data type is an error.
/// - `exec` applies the whole batch or reports failure; the caller follows a
///   failed `exec` with `discard` on the same batch.
/// - Errors are propagated unchanged, never retried by the store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// `GET key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// `HGETALL key`.
    async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>>;

    /// `LRANGE key start stop` with Redis index semantics (negative indexes
    /// count from the tail, `stop` is inclusive).
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;

    /// `LLEN key`.
    async fn llen(&self, key: &str) -> StoreResult<u64>;

    /// `SMEMBERS key`.
    async fn smembers(&self, key: &str) -> StoreResult<BTreeSet<String>>;

    /// `EXISTS key`.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// `MULTI` + queued commands + `EXEC`.
    async fn exec(&self, batch: &Batch) -> StoreResult<()>;

    /// `DISCARD` for a batch whose `exec` failed.
    async fn discard(&self, batch: &Batch) -> StoreResult<()>;
}
