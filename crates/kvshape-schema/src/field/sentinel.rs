//! Size sentinels.
//!
//! A collection is "set" exactly when its sentinel record exists; the
//! primary key may legitimately be missing because the store drops empty
//! collections.

use std::collections::BTreeSet;

use kvshape_store::{Batch, KvStore};

use crate::error::SchemaResult;
use crate::key::{sentinel_key, Sentinel};
use crate::ttl::Ttl;
use crate::value::decode_count;

/// Read a decimal count stored with `SET`.
pub(crate) async fn read_count(store: &dyn KvStore, key: &str) -> SchemaResult<Option<u64>> {
    store
        .get(key)
        .await?
        .map(|raw| decode_count(key, &raw))
        .transpose()
}

/// A string set paired with a `#size` sentinel.
///
/// Backs both `Set` fields and the field-name sets of shapes and
/// `hash_of` maps.
#[derive(Debug)]
pub(crate) struct SizedSet<'k> {
    key: &'k str,
    size_key: String,
}

impl<'k> SizedSet<'k> {
    pub(crate) fn new(key: &'k str) -> Self {
        Self {
            key,
            size_key: sentinel_key(key, Sentinel::Size),
        }
    }

    /// Key whose presence means the set was saved.
    pub(crate) fn existence_key(&self) -> &str {
        &self.size_key
    }

    /// Replace the members and the sentinel, then apply `ttl`.
    pub(crate) fn write(&self, members: Vec<String>, ttl: Option<Ttl>, batch: &mut Batch) {
        let size = members.len();
        batch.del(self.key);
        if size > 0 {
            batch.sadd(self.key, members);
        }
        batch.set(self.size_key.as_str(), size.to_string());
        self.expire(size > 0, ttl, batch);
    }

    /// Expire the sentinel, and the member key when it holds anything.
    pub(crate) fn expire(&self, non_empty: bool, ttl: Option<Ttl>, batch: &mut Batch) {
        let Some(ttl) = ttl else {
            return;
        };
        if non_empty {
            ttl.apply(self.key, batch);
        }
        ttl.apply(&self.size_key, batch);
    }

    pub(crate) fn delete(&self, batch: &mut Batch) {
        batch.del(self.key).del(self.size_key.as_str());
    }

    /// Members in sorted order, or `None` when the sentinel is missing.
    pub(crate) async fn load(&self, store: &dyn KvStore) -> SchemaResult<Option<BTreeSet<String>>> {
        match read_count(store, &self.size_key).await? {
            None => Ok(None),
            Some(0) => Ok(Some(BTreeSet::new())),
            Some(_) => Ok(Some(store.smembers(self.key).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvshape_store::{Command, InMemoryStore};

    #[test]
    fn empty_set_writes_only_the_sentinel() {
        let mut batch = Batch::new();
        SizedSet::new("tags").write(Vec::new(), Some(Ttl::seconds(5)), &mut batch);
        assert_eq!(
            batch.commands(),
            &[
                Command::Del { key: "tags".into() },
                Command::Set {
                    key: "tags#size".into(),
                    value: "0".into()
                },
                Command::Expire {
                    key: "tags#size".into(),
                    seconds: 5
                },
            ]
        );
    }

    #[tokio::test]
    async fn load_distinguishes_empty_from_missing() {
        let store = InMemoryStore::new();
        let set = SizedSet::new("tags");
        assert_eq!(set.load(&store).await.unwrap(), None);

        let mut batch = Batch::new();
        set.write(Vec::new(), None, &mut batch);
        store.exec(&batch).await.unwrap();
        assert_eq!(set.load(&store).await.unwrap(), Some(BTreeSet::new()));

        let mut batch = Batch::new();
        set.write(vec!["b".into(), "a".into()], None, &mut batch);
        store.exec(&batch).await.unwrap();
        let members = set.load(&store).await.unwrap().unwrap();
        assert_eq!(members.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn garbage_count_is_corrupt() {
        let store = InMemoryStore::new();
        let mut batch = Batch::new();
        batch.set("n", "many");
        store.exec(&batch).await.unwrap();
        let err = read_count(&store, "n").await.unwrap_err();
        assert!(matches!(err, crate::SchemaError::Corrupt { .. }));
    }
}
