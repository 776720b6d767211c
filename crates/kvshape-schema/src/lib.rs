//! Schema-driven mapping of nested JSON documents onto key-value primitives.
//!
//! A [`Schema`] maps field names to [`FieldSpec`]s. Binding a spec to a key
//! yields a [`BoundField`] that can save a value into a [`Batch`], load it
//! back, expire it, delete it, and check that it exists. Composite kinds
//! (`shape`, `list_of`, `hash_of`, `instance_of`) recurse into children bound
//! to derived keys, so one logical document occupies a key subtree.
//!
//! # Field Types
//!
//! - `string`, `number` -- one string key
//! - `hash`, `list`, `set` -- one collection key plus a size sentinel
//! - `shape` -- fixed named fields plus a field-name set
//! - `list_of` -- positional elements plus a length record
//! - `hash_of` -- dynamically named entries plus a field-name set
//! - `instance_of` -- another [`ModelDescriptor`] embedded under its own name
//!
//! # Design Rules
//!
//! 1. A value is validated in full before any command is queued.
//! 2. Sentinels, never primary keys, decide whether a field was set, so empty
//!    collections round-trip as empty.
//! 3. Every save rewrites the field wholesale; there are no partial updates.
//! 4. A TTL set on a composite cascades to every key below it.
//! 5. Sibling fields load concurrently.
//! 6. A stored record that no longer validates loads as absent.
//!
//! [`Batch`]: kvshape_store::Batch

pub mod descriptor;
pub mod error;
pub mod field;
pub mod key;
pub mod model;
pub mod spec;
pub mod ttl;
pub mod types;
pub mod value;

pub use descriptor::{FieldDef, FieldDefKind, ModelDef, SchemaFile};
pub use error::{SchemaError, SchemaResult};
pub use field::BoundField;
pub use model::{Model, ModelDescriptor};
pub use spec::{FieldKind, FieldSpec, Schema};
pub use ttl::Ttl;
pub use value::{kind_name, Loaded, Presence};
