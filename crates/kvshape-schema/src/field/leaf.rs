use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use kvshape_store::{Batch, KvStore};

use super::sentinel::{read_count, SizedSet};
use super::BoundField;
use crate::error::SchemaResult;
use crate::key::{child_key, sentinel_key, Sentinel};
use crate::spec::FieldKind;
use crate::value::{decode_number, encode_number, is_finite, Loaded};

impl<'a> BoundField<'a> {
    pub(super) fn check_leaf(&self, value: &Value) -> SchemaResult<()> {
        match (self.spec.kind(), value) {
            (FieldKind::Text, Value::String(_)) => Ok(()),
            (FieldKind::Number, Value::Number(n)) if is_finite(n) => Ok(()),
            (FieldKind::Hash, Value::Object(entries)) => {
                for (name, entry) in entries {
                    if !entry.is_string() {
                        return Err(self.mismatch_at(&child_key(&self.key, name), "string", Some(entry)));
                    }
                }
                Ok(())
            }
            (FieldKind::List, Value::Array(items)) => self.check_strings(items),
            (FieldKind::Set, Value::Array(items)) => {
                self.check_strings(items)?;
                let distinct: BTreeSet<&str> = items.iter().filter_map(Value::as_str).collect();
                if distinct.len() != items.len() {
                    return Err(self.mismatch_at(&self.key, "distinct members", Some(value)));
                }
                Ok(())
            }
            _ => Err(self.mismatch(Some(value))),
        }
    }

    fn check_strings(&self, items: &[Value]) -> SchemaResult<()> {
        for (index, item) in items.iter().enumerate() {
            if !item.is_string() {
                return Err(self.mismatch_at(
                    &child_key(&self.key, &index.to_string()),
                    "string",
                    Some(item),
                ));
            }
        }
        Ok(())
    }

    pub(super) fn write_leaf(&self, value: &Value, batch: &mut Batch) {
        match (self.spec.kind(), value) {
            (FieldKind::Text, Value::String(text)) => {
                batch.set(self.key.as_str(), text.as_str());
            }
            (FieldKind::Number, Value::Number(n)) => {
                batch.set(self.key.as_str(), encode_number(n));
            }
            (FieldKind::Hash, Value::Object(entries)) => {
                let fields: BTreeMap<String, String> = entries
                    .iter()
                    .filter_map(|(name, v)| v.as_str().map(|s| (name.clone(), s.to_string())))
                    .collect();
                let size = fields.len();
                batch.del(self.key.as_str());
                if size > 0 {
                    batch.hmset(self.key.as_str(), fields);
                }
                batch.set(sentinel_key(&self.key, Sentinel::Size), size.to_string());
            }
            (FieldKind::List, Value::Array(items)) => {
                let values = strings(items);
                let len = values.len();
                batch
                    .del(self.key.as_str())
                    .del(sentinel_key(&self.key, Sentinel::Length));
                if len > 0 {
                    batch.rpush(self.key.as_str(), values);
                }
                batch.set(sentinel_key(&self.key, Sentinel::Length), len.to_string());
            }
            (FieldKind::Set, Value::Array(items)) => {
                // SizedSet applies its own expiry.
                SizedSet::new(&self.key).write(strings(items), self.ttl, batch);
                return;
            }
            _ => return,
        }
        self.expire_leaf(value, batch);
    }

    pub(super) fn expire_leaf(&self, value: &Value, batch: &mut Batch) {
        let Some(ttl) = self.ttl else {
            return;
        };
        match (self.spec.kind(), value) {
            (FieldKind::Text | FieldKind::Number, _) => ttl.apply(&self.key, batch),
            (FieldKind::Hash, Value::Object(entries)) => {
                if !entries.is_empty() {
                    ttl.apply(&self.key, batch);
                }
                ttl.apply(&sentinel_key(&self.key, Sentinel::Size), batch);
            }
            (FieldKind::List, Value::Array(items)) => {
                if !items.is_empty() {
                    ttl.apply(&self.key, batch);
                }
                ttl.apply(&sentinel_key(&self.key, Sentinel::Length), batch);
            }
            (FieldKind::Set, Value::Array(items)) => {
                SizedSet::new(&self.key).expire(!items.is_empty(), self.ttl, batch);
            }
            _ => {}
        }
    }

    pub(super) fn delete_leaf(&self, batch: &mut Batch) {
        match self.spec.kind() {
            FieldKind::List => {
                batch
                    .del(self.key.as_str())
                    .del(sentinel_key(&self.key, Sentinel::Length));
            }
            FieldKind::Hash | FieldKind::Set => SizedSet::new(&self.key).delete(batch),
            _ => {
                batch.del(self.key.as_str());
            }
        }
    }

    pub(super) async fn load_leaf(&self, store: &dyn KvStore) -> SchemaResult<Loaded> {
        let value = match self.spec.kind() {
            FieldKind::Text => store.get(&self.key).await?.map(Value::String),
            FieldKind::Number => match store.get(&self.key).await? {
                Some(raw) => Some(decode_number(&self.key, &raw)?),
                None => None,
            },
            FieldKind::Hash => {
                match read_count(store, &sentinel_key(&self.key, Sentinel::Size)).await? {
                    None => None,
                    Some(0) => Some(Value::Object(Map::new())),
                    Some(_) => {
                        let entries = store.hgetall(&self.key).await?;
                        Some(Value::Object(
                            entries
                                .into_iter()
                                .map(|(name, v)| (name, Value::String(v)))
                                .collect(),
                        ))
                    }
                }
            }
            FieldKind::List => {
                match read_count(store, &sentinel_key(&self.key, Sentinel::Length)).await? {
                    None => None,
                    Some(0) => Some(Value::Array(Vec::new())),
                    Some(len) => {
                        let stop = i64::try_from(len).unwrap_or(i64::MAX) - 1;
                        let items = store.lrange(&self.key, 0, stop).await?;
                        Some(Value::Array(items.into_iter().map(Value::String).collect()))
                    }
                }
            }
            FieldKind::Set => SizedSet::new(&self.key)
                .load(store)
                .await?
                .map(|members| Value::Array(members.into_iter().map(Value::String).collect())),
            _ => None,
        };
        Ok(Loaded::from(value))
    }
}

fn strings(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.as_str().map(str::to_string))
        .collect()
}
