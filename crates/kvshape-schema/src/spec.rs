use std::collections::btree_map;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::field::BoundField;
use crate::key::child_key;
use crate::model::ModelDescriptor;
use crate::value::Presence;

/// The closed set of field types.
///
/// Leaves map directly onto one store primitive (plus a size sentinel for
/// collections); composites recurse into child [`FieldSpec`]s bound to
/// derived keys.
#[derive(Clone, Debug)]
pub enum FieldKind {
    /// UTF-8 string stored with `SET`.
    Text,
    /// Finite number stored in decimal with `SET`.
    Number,
    /// String-to-string map stored as a hash.
    Hash,
    /// Ordered list of strings.
    List,
    /// Set of distinct strings.
    Set,
    /// Record with a fixed set of named fields.
    Shape(Arc<Schema>),
    /// Homogeneous array of a sub-schema, addressed by index.
    ListOf(Arc<FieldSpec>),
    /// Map from dynamic names to a sub-schema.
    HashOf(Arc<FieldSpec>),
    /// Another model embedded under a namespaced key.
    InstanceOf(Arc<ModelDescriptor>),
}

impl FieldKind {
    /// Short type name, as used in schema descriptors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Number => "number",
            Self::Hash => "hash",
            Self::List => "list",
            Self::Set => "set",
            Self::Shape(_) => "shape",
            Self::ListOf(_) => "list_of",
            Self::HashOf(_) => "hash_of",
            Self::InstanceOf(_) => "instance_of",
        }
    }

    /// Returns `true` for kinds that recurse into child fields.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Self::Shape(_) | Self::ListOf(_) | Self::HashOf(_) | Self::InstanceOf(_)
        )
    }
}

/// A field type factory: a kind plus whether a value is required.
///
/// Specs are pure descriptions. [`FieldSpec::bind`] turns one into a
/// [`BoundField`] tied to a concrete key.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    kind: FieldKind,
    presence: Presence,
}

impl FieldSpec {
    /// An optional field of the given kind.
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            presence: Presence::Optional,
        }
    }

    /// The required variant of this spec.
    pub fn required(mut self) -> Self {
        self.presence = Presence::Required;
        self
    }

    /// The optional variant of this spec.
    pub fn optional(mut self) -> Self {
        self.presence = Presence::Optional;
        self
    }

    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }

    /// Instantiate this spec for field `name` under `parent_key`.
    pub fn bind(&self, parent_key: &str, name: &str) -> BoundField<'_> {
        BoundField::new(self, child_key(parent_key, name))
    }

    /// Instantiate this spec at an absolute key.
    pub fn bind_at(&self, key: impl Into<String>) -> BoundField<'_> {
        BoundField::new(self, key.into())
    }
}

/// Field name to field spec. Iteration is in name order.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Insert or replace a field, returning the previous spec.
    pub fn insert(&mut self, name: impl Into<String>, spec: FieldSpec) -> Option<FieldSpec> {
        self.fields.insert(name.into(), spec)
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldSpec> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = (&'a String, &'a FieldSpec);
    type IntoIter = btree_map::Iter<'a, String, FieldSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl<N: Into<String>> FromIterator<(N, FieldSpec)> for Schema {
    fn from_iter<I: IntoIterator<Item = (N, FieldSpec)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, spec)| (name.into(), spec))
                .collect(),
        }
    }
}
