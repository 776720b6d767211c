//! In-memory store with Redis data-type and expiry semantics.
//!
//! [`InMemoryStore`] keeps every entry in a `HashMap` behind a `RwLock`. It
//! implements the full [`KvStore`] trait and is suitable for unit tests,
//! dry runs, and short-lived processes. Expired entries are invisible to
//! readers and evicted when a batch next touches their key.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::command::{Batch, Command};
use crate::error::{StoreError, StoreResult};
use crate::traits::KvStore;

/// The Redis data type held by a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    String,
    Hash,
    List,
    Set,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Hash => write!(f, "hash"),
            Self::List => write!(f, "list"),
            Self::Set => write!(f, "set"),
        }
    }
}

/// The value stored under one key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Data {
    String(String),
    Hash(BTreeMap<String, String>),
    List(Vec<String>),
    Set(BTreeSet<String>),
}

impl Data {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::String(_) => EntryKind::String,
            Self::Hash(_) => EntryKind::Hash,
            Self::List(_) => EntryKind::List,
            Self::Set(_) => EntryKind::Set,
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    data: Data,
    /// Absolute expiry in epoch milliseconds.
    expires_at_ms: Option<u64>,
}

impl Entry {
    fn new(data: Data) -> Self {
        Self {
            data,
            expires_at_ms: None,
        }
    }

    fn is_live(&self, now_ms: u64) -> bool {
        self.expires_at_ms.map_or(true, |at| at > now_ms)
    }
}

/// An in-memory implementation of [`KvStore`].
///
/// A batch is applied in place while an undo log records the prior entry of
/// each key it touches. A failing command rolls those keys back, so the
/// store is left unchanged.
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    /// Create an empty store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the live value of `key`, if any.
    fn with_live<R>(&self, key: &str, f: impl FnOnce(Option<&Data>) -> R) -> R {
        let now = self.clock.now_ms();
        let entries = self.read_entries();
        let data = entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| &entry.data);
        f(data)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        self.read_entries()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Returns `true` if no live key exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted list of live keys.
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now_ms();
        let mut keys: Vec<String> = self
            .read_entries()
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Snapshot of the live value under `key`.
    pub fn data(&self, key: &str) -> Option<Data> {
        self.with_live(key, |data| data.cloned())
    }

    /// Remaining time to live of `key` in milliseconds, if it has one.
    pub fn ttl_ms(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_ms();
        self.read_entries()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at_ms)
            .map(|at| at - now)
    }

    /// Remove every key.
    pub fn clear(&self) {
        self.write_entries().clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("key_count", &self.len())
            .field("clock", &self.clock)
            .finish()
    }
}

fn wrong_type(key: &str, expected: EntryKind, actual: EntryKind) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
        actual,
    }
}

fn require_arguments(command: &'static str, key: &str, count: usize) -> StoreResult<()> {
    if count == 0 {
        return Err(StoreError::InvalidCommand {
            command,
            key: key.to_string(),
            reason: "wrong number of arguments".into(),
        });
    }
    Ok(())
}

/// Apply one command to the staged map.
fn apply(entries: &mut HashMap<String, Entry>, command: &Command, now_ms: u64) -> StoreResult<()> {
    match command {
        Command::Set { key, value } => {
            entries.insert(key.clone(), Entry::new(Data::String(value.clone())));
        }
        Command::Del { key } => {
            entries.remove(key);
        }
        Command::Expire { key, seconds } => {
            if *seconds <= 0 {
                entries.remove(key);
            } else if let Some(entry) = entries.get_mut(key) {
                let ttl_ms = (*seconds as u64).saturating_mul(1000);
                entry.expires_at_ms = Some(now_ms.saturating_add(ttl_ms));
            }
        }
        Command::ExpireAt { key, timestamp } => {
            let at_ms = (*timestamp).max(0) as u64;
            let at_ms = at_ms.saturating_mul(1000);
            if at_ms <= now_ms {
                entries.remove(key);
            } else if let Some(entry) = entries.get_mut(key) {
                entry.expires_at_ms = Some(at_ms);
            }
        }
        Command::HMSet { key, fields } => {
            require_arguments("HMSET", key, fields.len())?;
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(Data::Hash(BTreeMap::new())));
            match &mut entry.data {
                Data::Hash(hash) => {
                    hash.extend(fields.iter().map(|(f, v)| (f.clone(), v.clone())));
                }
                other => return Err(wrong_type(key, EntryKind::Hash, other.kind())),
            }
        }
        Command::RPush { key, values } => {
            require_arguments("RPUSH", key, values.len())?;
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(Data::List(Vec::new())));
            match &mut entry.data {
                Data::List(list) => list.extend(values.iter().cloned()),
                other => return Err(wrong_type(key, EntryKind::List, other.kind())),
            }
        }
        Command::SAdd { key, members } => {
            require_arguments("SADD", key, members.len())?;
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(Data::Set(BTreeSet::new())));
            match &mut entry.data {
                Data::Set(set) => set.extend(members.iter().cloned()),
                other => return Err(wrong_type(key, EntryKind::Set, other.kind())),
            }
        }
    }
    Ok(())
}

fn rollback(entries: &mut HashMap<String, Entry>, undo: HashMap<String, Option<Entry>>) {
    for (key, prior) in undo {
        match prior {
            Some(entry) => {
                entries.insert(key, entry);
            }
            None => {
                entries.remove(&key);
            }
        }
    }
}

/// Resolve Redis `LRANGE` indexes against a list of `len` elements.
fn range_bounds(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start >= len || start > stop {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_live(key, |data| match data {
            None => Ok(None),
            Some(Data::String(value)) => Ok(Some(value.clone())),
            Some(other) => Err(wrong_type(key, EntryKind::String, other.kind())),
        })
    }

    async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        self.with_live(key, |data| match data {
            None => Ok(BTreeMap::new()),
            Some(Data::Hash(hash)) => Ok(hash.clone()),
            Some(other) => Err(wrong_type(key, EntryKind::Hash, other.kind())),
        })
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        self.with_live(key, |data| match data {
            None => Ok(Vec::new()),
            Some(Data::List(list)) => Ok(range_bounds(list.len(), start, stop)
                .map(|(from, to)| list[from..=to].to_vec())
                .unwrap_or_default()),
            Some(other) => Err(wrong_type(key, EntryKind::List, other.kind())),
        })
    }

    async fn llen(&self, key: &str) -> StoreResult<u64> {
        self.with_live(key, |data| match data {
            None => Ok(0),
            Some(Data::List(list)) => Ok(list.len() as u64),
            Some(other) => Err(wrong_type(key, EntryKind::List, other.kind())),
        })
    }

    async fn smembers(&self, key: &str) -> StoreResult<BTreeSet<String>> {
        self.with_live(key, |data| match data {
            None => Ok(BTreeSet::new()),
            Some(Data::Set(set)) => Ok(set.clone()),
            Some(other) => Err(wrong_type(key, EntryKind::Set, other.kind())),
        })
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.with_live(key, |data| data.is_some()))
    }

    async fn exec(&self, batch: &Batch) -> StoreResult<()> {
        let now = self.clock.now_ms();
        let mut entries = self.write_entries();

        let mut undo: HashMap<String, Option<Entry>> = HashMap::new();
        for command in batch {
            let key = command.key();
            undo.entry(key.to_string())
                .or_insert_with(|| entries.get(key).cloned());
            if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
                entries.remove(key);
            }
            if let Err(err) = apply(&mut entries, command, now) {
                rollback(&mut entries, undo);
                return Err(err);
            }
        }

        debug!(commands = batch.len(), touched = undo.len(), "batch applied");
        Ok(())
    }

    async fn discard(&self, batch: &Batch) -> StoreResult<()> {
        // Nothing is queued server-side; a failed exec already left the map untouched.
        debug!(commands = batch.len(), "batch discarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;

    fn store_with_clock() -> (InMemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        (InMemoryStore::with_clock(clock.clone()), clock)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // -----------------------------------------------------------------------
    // Strings
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn set_and_get() {
        let store = InMemoryStore::new();
        let mut batch = Batch::new();
        batch.set("greeting", "hello");
        store.exec(&batch).await.unwrap();

        assert_eq!(store.get("greeting").await.unwrap().as_deref(), Some("hello"));
        assert!(store.exists("greeting").await.unwrap());
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn del_removes_key() {
        let store = InMemoryStore::new();
        let mut batch = Batch::new();
        batch.set("k", "v").del("k");
        store.exec(&batch).await.unwrap();
        assert!(!store.exists("k").await.unwrap());
        assert!(store.is_empty());
    }

    // -----------------------------------------------------------------------
    // Collections
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn rpush_and_lrange() {
        let store = InMemoryStore::new();
        let mut batch = Batch::new();
        batch
            .rpush("list", strings(&["a", "b"]))
            .rpush("list", strings(&["c"]));
        store.exec(&batch).await.unwrap();

        assert_eq!(store.llen("list").await.unwrap(), 3);
        assert_eq!(store.lrange("list", 0, -1).await.unwrap(), strings(&["a", "b", "c"]));
        assert_eq!(store.lrange("list", 1, 1).await.unwrap(), strings(&["b"]));
        assert_eq!(store.lrange("list", -2, 10).await.unwrap(), strings(&["b", "c"]));
        assert!(store.lrange("list", 5, 9).await.unwrap().is_empty());
        assert!(store.lrange("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hmset_merges_fields() {
        let store = InMemoryStore::new();
        let mut batch = Batch::new();
        batch
            .hmset("h", BTreeMap::from([("a".into(), "1".into())]))
            .hmset("h", BTreeMap::from([("b".into(), "2".into())]));
        store.exec(&batch).await.unwrap();

        let hash = store.hgetall("h").await.unwrap();
        assert_eq!(hash.len(), 2);
        assert_eq!(hash["b"], "2");
        assert!(store.hgetall("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sadd_deduplicates() {
        let store = InMemoryStore::new();
        let mut batch = Batch::new();
        batch.sadd("s", strings(&["x", "y", "x"]));
        store.exec(&batch).await.unwrap();

        let members = store.smembers("s").await.unwrap();
        assert_eq!(members.into_iter().collect::<Vec<_>>(), strings(&["x", "y"]));
    }

    #[tokio::test]
    async fn empty_variadic_command_is_rejected() {
        let store = InMemoryStore::new();
        let mut batch = Batch::new();
        batch.sadd("s", Vec::new());
        let err = store.exec(&batch).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidCommand { command: "SADD", .. }));
    }

    // -----------------------------------------------------------------------
    // Type errors and atomicity
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn wrong_type_read_is_an_error() {
        let store = InMemoryStore::new();
        let mut batch = Batch::new();
        batch.set("k", "v");
        store.exec(&batch).await.unwrap();

        let err = store.smembers("k").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::WrongType {
                key: "k".into(),
                expected: EntryKind::Set,
                actual: EntryKind::String,
            }
        );
    }

    #[tokio::test]
    async fn failing_batch_leaves_store_unchanged() {
        let store = InMemoryStore::new();
        let mut seed = Batch::new();
        seed.set("k", "original");
        store.exec(&seed).await.unwrap();

        let mut batch = Batch::new();
        batch.set("other", "x").rpush("k", strings(&["boom"]));
        assert!(store.exec(&batch).await.is_err());

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("original"));
        assert!(!store.exists("other").await.unwrap());
        store.discard(&batch).await.unwrap();
    }

    #[tokio::test]
    async fn failing_batch_restores_every_touched_key() {
        let (store, clock) = store_with_clock();
        let mut seed = Batch::new();
        seed.set("a", "1")
            .expire("a", 10)
            .sadd("s", strings(&["x"]))
            .set("gone", "v")
            .expire("gone", 1);
        store.exec(&seed).await.unwrap();
        clock.advance(Duration::from_secs(2));

        let mut batch = Batch::new();
        batch
            .del("a")
            .set("a", "2")
            .sadd("s", strings(&["y"]))
            .set("gone", "back")
            .set("new", "n")
            .hmset("s", BTreeMap::from([("f".to_string(), "v".to_string())]));
        assert!(store.exec(&batch).await.is_err());

        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.ttl_ms("a"), Some(8_000));
        assert_eq!(store.data("s"), Some(Data::Set(["x".to_string()].into())));
        assert!(!store.exists("gone").await.unwrap());
        assert!(!store.exists("new").await.unwrap());
        assert_eq!(store.keys(), strings(&["a", "s"]));
    }

    // -----------------------------------------------------------------------
    // Expiry
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn expire_hides_key_after_deadline() {
        let (store, clock) = store_with_clock();
        let mut batch = Batch::new();
        batch.set("k", "v").expire("k", 2);
        store.exec(&batch).await.unwrap();

        assert_eq!(store.ttl_ms("k"), Some(2_000));
        clock.advance(Duration::from_millis(1_999));
        assert!(store.exists("k").await.unwrap());
        clock.advance(Duration::from_millis(1));
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_clears_ttl() {
        let (store, _clock) = store_with_clock();
        let mut batch = Batch::new();
        batch.set("k", "v").expire("k", 2).set("k", "w");
        store.exec(&batch).await.unwrap();
        assert_eq!(store.ttl_ms("k"), None);
    }

    #[tokio::test]
    async fn expire_at_in_the_past_deletes() {
        let (store, _clock) = store_with_clock();
        let mut batch = Batch::new();
        batch.set("k", "v").expire_at("k", 10);
        store.exec(&batch).await.unwrap();
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn expire_at_in_the_future() {
        let (store, clock) = store_with_clock();
        let deadline_secs = (clock.now_ms() / 1000 + 5) as i64;
        let mut batch = Batch::new();
        batch.sadd("s", strings(&["a"])).expire_at("s", deadline_secs);
        store.exec(&batch).await.unwrap();
        assert!(store.exists("s").await.unwrap());
        clock.advance(Duration::from_secs(5));
        assert!(!store.exists("s").await.unwrap());
    }

    #[tokio::test]
    async fn non_positive_expire_deletes_and_missing_key_is_ignored() {
        let (store, _clock) = store_with_clock();
        let mut batch = Batch::new();
        batch.set("k", "v").expire("k", 0).expire("ghost", 10);
        store.exec(&batch).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_next_batch() {
        let (store, clock) = store_with_clock();
        let mut batch = Batch::new();
        batch.set("old", "v").expire("old", 1);
        store.exec(&batch).await.unwrap();
        clock.advance(Duration::from_secs(2));

        let mut next = Batch::new();
        next.rpush("old", strings(&["fresh"]));
        store.exec(&next).await.unwrap();
        assert_eq!(store.data("old"), Some(Data::List(strings(&["fresh"]))));
        assert_eq!(store.keys(), strings(&["old"]));
    }

    #[test]
    fn range_bounds_follow_redis() {
        assert_eq!(range_bounds(0, 0, -1), None);
        assert_eq!(range_bounds(3, 0, -1), Some((0, 2)));
        assert_eq!(range_bounds(3, -10, 0), Some((0, 0)));
        assert_eq!(range_bounds(3, 2, 1), None);
    }
}
