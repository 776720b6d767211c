//! Bound fields: a [`FieldSpec`] tied to a concrete store key.
//!
//! All operations are recursive over the field's kind. Saves are split into
//! an in-memory [`check`](BoundField::check) over the whole value followed by
//! an unchecked write, so a rejected value never leaves commands behind in
//! the batch.

mod composite;
mod leaf;
pub(crate) mod sentinel;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use kvshape_store::{Batch, KvStore};

use crate::error::{SchemaError, SchemaResult};
use crate::key;
use crate::spec::{FieldKind, FieldSpec};
use crate::ttl::Ttl;
use crate::value::{kind_name, present, Loaded};

/// A field instance bound to one key for its whole lifetime.
///
/// Cheap to build; create one per operation and drop it afterwards.
#[derive(Clone, Debug)]
pub struct BoundField<'a> {
    spec: &'a FieldSpec,
    key: String,
    ttl: Option<Ttl>,
}

impl<'a> BoundField<'a> {
    pub(crate) fn new(spec: &'a FieldSpec, key: String) -> Self {
        Self {
            spec,
            key,
            ttl: None,
        }
    }

    /// Configure or clear the expiry cascaded to every key of this field.
    pub fn with_ttl(mut self, ttl: Option<Ttl>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn spec(&self) -> &'a FieldSpec {
        self.spec
    }

    /// Absolute store key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key relative to `parent`.
    pub fn relative_key(&self, parent: &str) -> &str {
        key::relative_key(&self.key, parent)
    }

    pub fn ttl(&self) -> Option<Ttl> {
        self.ttl
    }

    /// Bind a child spec below this field, inheriting its TTL.
    pub(crate) fn child(&self, spec: &'a FieldSpec, segment: &str) -> BoundField<'a> {
        spec.bind(&self.key, segment).with_ttl(self.ttl)
    }

    /// Check `value` against this field, reporting the first offending key.
    ///
    /// `None` and JSON `null` mean absent, which only optional fields accept.
    pub fn check(&self, value: Option<&Value>) -> SchemaResult<()> {
        let Some(value) = present(value) else {
            if self.spec.is_required() {
                return Err(self.mismatch(None));
            }
            return Ok(());
        };
        if self.spec.kind().is_composite() {
            self.check_composite(value)
        } else {
            self.check_leaf(value)
        }
    }

    pub fn validate(&self, value: Option<&Value>) -> bool {
        self.check(value).is_ok()
    }

    /// Validate `value`, then queue every write it needs.
    ///
    /// Absent optional values queue a delete of the field's keys so stale
    /// data does not survive. On error the batch is left untouched.
    pub fn save(&self, value: Option<&Value>, batch: &mut Batch) -> SchemaResult<()> {
        self.check(value)?;
        self.write(value, batch);
        Ok(())
    }

    /// Re-issue only the TTL directives for the keys `value` occupies.
    pub fn expire(&self, value: Option<&Value>, batch: &mut Batch) -> SchemaResult<()> {
        self.check(value)?;
        self.write_expiry(value, batch);
        Ok(())
    }

    /// Queue removal of every key this field owns statically.
    ///
    /// Element keys of `list_of` and `hash_of` are reached only through
    /// their sentinel, so dropping the sentinel makes them unreachable.
    pub fn delete(&self, batch: &mut Batch) {
        match self.spec.kind() {
            FieldKind::Text | FieldKind::Number => {
                batch.del(self.key.as_str());
            }
            FieldKind::Hash | FieldKind::List | FieldKind::Set => self.delete_leaf(batch),
            _ => self.delete_composite(batch),
        }
    }

    /// Read the field back. Boxed because composites recurse.
    pub fn load<'s>(&'s self, store: &'s dyn KvStore) -> BoxFuture<'s, SchemaResult<Loaded>> {
        async move {
            let loaded = if self.spec.kind().is_composite() {
                self.load_composite(store).await?
            } else {
                self.load_leaf(store).await?
            };
            debug!(key = %self.key, present = loaded.is_present(), "loaded field");
            Ok(loaded)
        }
        .boxed()
    }

    /// `EXISTS` on the key that records whether the field was saved.
    pub async fn exists(&self, store: &dyn KvStore) -> SchemaResult<bool> {
        Ok(store.exists(&self.existence_key()).await?)
    }

    pub(crate) fn existence_key(&self) -> String {
        match self.spec.kind() {
            FieldKind::Text | FieldKind::Number | FieldKind::ListOf(_) => self.key.clone(),
            FieldKind::List => key::sentinel_key(&self.key, key::Sentinel::Length),
            FieldKind::Hash | FieldKind::Set | FieldKind::Shape(_) | FieldKind::HashOf(_) => {
                sentinel::SizedSet::new(&self.key).existence_key().to_string()
            }
            FieldKind::InstanceOf(model) => self.instance_record(model).existence_key(),
        }
    }

    /// Queue writes for a value that already passed [`check`](Self::check).
    pub(crate) fn write(&self, value: Option<&Value>, batch: &mut Batch) {
        match present(value) {
            None => self.delete(batch),
            Some(value) if self.spec.kind().is_composite() => self.write_composite(value, batch),
            Some(value) => self.write_leaf(value, batch),
        }
    }

    pub(crate) fn write_expiry(&self, value: Option<&Value>, batch: &mut Batch) {
        let Some(value) = present(value) else {
            return;
        };
        if self.spec.kind().is_composite() {
            self.expire_composite(value, batch);
        } else {
            self.expire_leaf(value, batch);
        }
    }

    pub(crate) fn mismatch(&self, found: Option<&Value>) -> SchemaError {
        self.mismatch_at(&self.key, expected(self.spec.kind()), found)
    }

    pub(crate) fn mismatch_at(
        &self,
        key: &str,
        expected: impl Into<String>,
        found: Option<&Value>,
    ) -> SchemaError {
        SchemaError::TypeMismatch {
            key: key.to_string(),
            expected: expected.into(),
            found: found.map_or("nothing", kind_name),
        }
    }
}

fn expected(kind: &FieldKind) -> String {
    match kind {
        FieldKind::Text => "string".into(),
        FieldKind::Number => "finite number".into(),
        FieldKind::Hash => "object of strings".into(),
        FieldKind::List => "array of strings".into(),
        FieldKind::Set => "array of distinct strings".into(),
        FieldKind::Shape(_) | FieldKind::HashOf(_) => "object".into(),
        FieldKind::ListOf(_) => "array".into(),
        FieldKind::InstanceOf(model) => format!("{} object", model.name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types;
    use crate::Schema;
    use kvshape_store::{Command, InMemoryStore};
    use serde_json::json;

    async fn round_trip(spec: &FieldSpec, value: Value) -> Loaded {
        let store = InMemoryStore::new();
        let field = spec.bind_at("root");
        let mut batch = Batch::new();
        field.save(Some(&value), &mut batch).unwrap();
        store.exec(&batch).await.unwrap();
        field.load(&store).await.unwrap()
    }

    #[test]
    fn required_rejects_null_and_missing() {
        let spec = types::string().required();
        let field = spec.bind_at("name");
        let err = field.check(Some(&Value::Null)).unwrap_err();
        assert_eq!(
            err,
            SchemaError::TypeMismatch {
                key: "name".into(),
                expected: "string".into(),
                found: "nothing",
            }
        );
        assert!(!field.validate(None));
        assert!(types::string().bind_at("name").validate(None));
    }

    #[test]
    fn failed_save_leaves_batch_untouched() {
        let spec = types::shape(
            Schema::new()
                .field("a", types::string())
                .field("b", types::number().required()),
        );
        let field = spec.bind_at("root");
        let mut batch = Batch::new();
        batch.set("unrelated", "1");
        let err = field
            .save(Some(&json!({"a": "x", "b": "nope"})), &mut batch)
            .unwrap_err();
        assert!(err.is_type_mismatch());
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn absent_optional_save_deletes() {
        let spec = types::list();
        let mut batch = Batch::new();
        spec.bind_at("items").save(None, &mut batch).unwrap();
        assert_eq!(
            batch.commands(),
            &[
                Command::Del { key: "items".into() },
                Command::Del {
                    key: "items#len".into()
                },
            ]
        );
    }

    #[test]
    fn expire_only_touches_occupied_keys() {
        let spec = types::list();
        let field = spec.bind_at("items").with_ttl(Some(Ttl::seconds(9)));
        let mut batch = Batch::new();
        field.expire(Some(&json!([])), &mut batch).unwrap();
        assert_eq!(
            batch.commands(),
            &[Command::Expire {
                key: "items#len".into(),
                seconds: 9
            }]
        );
        assert!(batch.iter().all(Command::is_expiry));
    }

    #[tokio::test]
    async fn exists_follows_the_sentinel() {
        let store = InMemoryStore::new();
        let spec = types::set();
        let field = spec.bind_at("tags");
        assert!(!field.exists(&store).await.unwrap());

        let mut batch = Batch::new();
        field.save(Some(&json!([])), &mut batch).unwrap();
        store.exec(&batch).await.unwrap();
        assert!(field.exists(&store).await.unwrap());
        assert!(!store.exists("tags").await.unwrap());
    }

    #[tokio::test]
    async fn nested_round_trip() {
        let spec = types::list_of(types::shape(
            Schema::new()
                .field("label", types::string().required())
                .field("scores", types::list_of(types::number())),
        ));
        let value = json!([
            {"label": "first", "scores": [1, 2.5, -3]},
            {"label": "second", "scores": []},
        ]);
        assert_eq!(round_trip(&spec, value.clone()).await, Loaded::Present(value));
    }
}
