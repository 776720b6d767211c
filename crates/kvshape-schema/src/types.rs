//! Constructors for every field type.
//!
//! ```
//! use kvshape_schema::{types, Schema};
//!
//! let schema = Schema::new()
//!     .field("name", types::string().required())
//!     .field("tags", types::set())
//!     .field(
//!         "posts",
//!         types::list_of(types::shape(
//!             Schema::new().field("title", types::string().required()),
//!         )),
//!     );
//! assert_eq!(schema.len(), 3);
//! ```

use std::sync::Arc;

use crate::model::{Model, ModelDescriptor};
use crate::spec::{FieldKind, FieldSpec, Schema};

pub fn string() -> FieldSpec {
    FieldSpec::new(FieldKind::Text)
}

pub fn number() -> FieldSpec {
    FieldSpec::new(FieldKind::Number)
}

pub fn hash() -> FieldSpec {
    FieldSpec::new(FieldKind::Hash)
}

pub fn list() -> FieldSpec {
    FieldSpec::new(FieldKind::List)
}

pub fn set() -> FieldSpec {
    FieldSpec::new(FieldKind::Set)
}

pub fn shape(schema: Schema) -> FieldSpec {
    FieldSpec::new(FieldKind::Shape(Arc::new(schema)))
}

pub fn list_of(item: FieldSpec) -> FieldSpec {
    FieldSpec::new(FieldKind::ListOf(Arc::new(item)))
}

/// A map of dynamic names to values of `item`.
///
/// Only the name set is cleared on delete or re-save. Keys of entries that
/// are dropped stay in the store, unreachable, until their TTL lapses; give
/// the model a TTL if entry names churn.
pub fn hash_of(item: FieldSpec) -> FieldSpec {
    FieldSpec::new(FieldKind::HashOf(Arc::new(item)))
}

/// Embed a model described at runtime.
pub fn instance_of(model: Arc<ModelDescriptor>) -> FieldSpec {
    FieldSpec::new(FieldKind::InstanceOf(model))
}

/// Embed a statically declared [`Model`].
///
/// The model's descriptor is built eagerly, so a model cannot embed itself.
pub fn model<M: Model>() -> FieldSpec {
    instance_of(Arc::new(M::descriptor()))
}
