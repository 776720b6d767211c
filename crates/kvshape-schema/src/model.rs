use std::sync::Arc;

use crate::field::BoundField;
use crate::spec::{FieldKind, FieldSpec, Schema};
use crate::ttl::Ttl;

/// A named schema with a default root key and an optional default TTL.
///
/// The root of a model is a required shape: the model is present exactly
/// when its field-name set is.
#[derive(Clone, Debug)]
pub struct ModelDescriptor {
    name: String,
    key: String,
    ttl: Option<Ttl>,
    schema: Arc<Schema>,
    root: FieldSpec,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, key: impl Into<String>, schema: Schema) -> Self {
        let schema = Arc::new(schema);
        let root = FieldSpec::new(FieldKind::Shape(schema.clone())).required();
        Self {
            name: name.into(),
            key: key.into(),
            ttl: None,
            schema,
            root,
        }
    }

    /// Set the default TTL applied to every key of the model.
    pub fn with_ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The default root key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Option<Ttl> {
        self.ttl
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The required shape spec describing the whole model.
    pub fn root_spec(&self) -> &FieldSpec {
        &self.root
    }

    /// Segment under which an embedding field stores this model.
    pub fn instance_segment(&self) -> String {
        format!("{}Instance", self.name)
    }

    /// Bind the model at its default key with its default TTL.
    pub fn bind(&self) -> BoundField<'_> {
        self.bind_at(&self.key)
    }

    /// Bind the model at another root key, keeping the default TTL.
    pub fn bind_at(&self, key: &str) -> BoundField<'_> {
        self.root.bind_at(key).with_ttl(self.ttl)
    }
}

/// A statically declared model.
///
/// ```
/// use kvshape_schema::{types, Model, ModelDescriptor, Schema, Ttl};
///
/// struct Session;
///
/// impl Model for Session {
///     fn descriptor() -> ModelDescriptor {
///         ModelDescriptor::new(
///             "Session",
///             "session",
///             Schema::new().field("user", types::string().required()),
///         )
///         .with_ttl(Ttl::seconds(900))
///     }
/// }
///
/// assert_eq!(Session::descriptor().bind().key(), "session");
/// ```
pub trait Model {
    fn descriptor() -> ModelDescriptor;
}
