//! Typed persistence of nested models in a Redis-like key-value store.
//!
//! A [`Repository`] binds one [`ModelDescriptor`] to one root key and an
//! injected [`KvStore`]. Saves and deletes build a single [`Batch`] across
//! the whole schema tree and commit it once; loads read every field back
//! concurrently and re-validate the assembled document.
//!
//! ```no_run
//! use std::sync::Arc;
//! use kvshape::{types, InMemoryStore, Model, ModelDescriptor, Repository, Schema, Ttl};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Session {
//!     user: String,
//!     scopes: Vec<String>,
//! }
//!
//! impl Model for Session {
//!     fn descriptor() -> ModelDescriptor {
//!         ModelDescriptor::new(
//!             "Session",
//!             "session",
//!             Schema::new()
//!                 .field("user", types::string().required())
//!                 .field("scopes", types::set().required()),
//!         )
//!         .with_ttl(Ttl::seconds(900))
//!     }
//! }
//!
//! # async fn run() -> kvshape::RepoResult<()> {
//! let repo = Repository::<Session>::new(Arc::new(InMemoryStore::new())).with_key("session:42")?;
//! repo.save_model(&Session { user: "ada".into(), scopes: vec!["read".into()] }).await?;
//! let loaded = repo.load_model().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod document;
pub mod error;
pub mod protocol;
pub mod repository;

pub use config::RepositoryConfig;
pub use error::{CommitStage, RepoError, RepoResult};
pub use protocol::{commit, Ack};
pub use repository::Repository;

// Re-export the types needed to declare and back a model.
pub use kvshape_schema::{
    types, FieldSpec, Loaded, Model, ModelDescriptor, Schema, SchemaError, SchemaFile, Ttl,
};
pub use kvshape_store::{Batch, Command, InMemoryStore, KvStore, StoreError};
