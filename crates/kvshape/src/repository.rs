use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use kvshape_schema::key::validate_root_key;
use kvshape_schema::{BoundField, Loaded, Model, ModelDescriptor, SchemaError, Ttl};
use kvshape_store::{Batch, KvStore};

use crate::config::RepositoryConfig;
use crate::document::{to_document, DocumentError};
use crate::error::{RepoError, RepoResult};
use crate::protocol::{commit, Ack};

/// Saves, loads, expires and deletes one model instance under one root key.
///
/// The store handle is injected; every call builds its own batch and holds
/// nothing open afterwards. `T` is any serde type whose JSON form matches the
/// model's schema. `Repository<serde_json::Value>` works on raw documents.
pub struct Repository<T> {
    model: Arc<ModelDescriptor>,
    key: String,
    ttl: Option<Ttl>,
    store: Arc<dyn KvStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Model> Repository<T> {
    /// Repository for a statically declared model at its default key.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::from_descriptor(Arc::new(T::descriptor()), store)
    }
}

impl<T> Repository<T> {
    pub fn from_descriptor(model: Arc<ModelDescriptor>, store: Arc<dyn KvStore>) -> Self {
        Self {
            key: model.key().to_string(),
            ttl: model.ttl(),
            model,
            store,
            _marker: PhantomData,
        }
    }

    /// Use another root key for this instance.
    pub fn with_key(mut self, key: impl Into<String>) -> RepoResult<Self> {
        let key = key.into();
        validate_root_key(&key)?;
        self.key = key;
        Ok(self)
    }

    /// Override the model's default TTL. `None` disables expiry.
    pub fn with_ttl(mut self, ttl: Option<Ttl>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Apply the overrides present in `config`.
    pub fn with_config(self, config: &RepositoryConfig) -> RepoResult<Self> {
        let repo = match &config.key {
            Some(key) => self.with_key(key.clone())?,
            None => self,
        };
        Ok(match config.ttl {
            Some(ttl) => repo.with_ttl(Some(ttl)),
            None => repo,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Option<Ttl> {
        self.ttl
    }

    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    fn root(&self) -> BoundField<'_> {
        self.model.bind_at(&self.key).with_ttl(self.ttl)
    }

    /// Remove every key the model owns.
    pub async fn delete_model(&self) -> RepoResult<Ack> {
        let mut batch = Batch::new();
        self.root().delete(&mut batch);
        let ack = commit(self.store.as_ref(), &batch).await?;
        info!(model = self.model.name(), key = %self.key, "deleted model");
        Ok(ack)
    }

    pub async fn exists_model(&self) -> RepoResult<bool> {
        Ok(self.root().exists(self.store.as_ref()).await?)
    }
}

impl<T: Serialize + DeserializeOwned> Repository<T> {
    /// The batch [`save_model`](Self::save_model) would commit.
    pub fn plan_save(&self, value: &T) -> RepoResult<Batch> {
        let root = self.root();
        let document = document(&root, value)?;
        let mut batch = Batch::new();
        root.save(Some(&document), &mut batch)?;
        Ok(batch)
    }

    /// Validate `value` and replace the stored instance with it atomically.
    pub async fn save_model(&self, value: &T) -> RepoResult<Ack> {
        let batch = self.plan_save(value)?;
        let ack = commit(self.store.as_ref(), &batch).await?;
        info!(model = self.model.name(), key = %self.key, commands = ack.commands, "saved model");
        Ok(ack)
    }

    /// Re-apply the TTL to the keys `value` occupies without rewriting data.
    pub async fn expire_model(&self, value: &T) -> RepoResult<Ack> {
        let root = self.root();
        let document = document(&root, value)?;
        let mut batch = Batch::new();
        root.expire(Some(&document), &mut batch)?;
        commit(self.store.as_ref(), &batch).await
    }

    /// `None` when the instance was never saved, was deleted, has expired,
    /// or no longer validates.
    pub async fn load_model(&self) -> RepoResult<Option<T>> {
        let root = self.root();
        match root.load(self.store.as_ref()).await? {
            Loaded::Present(document) => Ok(Some(from_document(document)?)),
            Loaded::Absent => {
                debug!(model = self.model.name(), key = %self.key, "model absent");
                Ok(None)
            }
        }
    }
}

/// Non-finite floats are reported at the store key they would occupy.
fn document<T: Serialize>(root: &BoundField<'_>, value: &T) -> RepoResult<Value> {
    to_document(value).map_err(|err| match err {
        DocumentError::NonFinite { path } => RepoError::Schema(SchemaError::TypeMismatch {
            key: root.key_at(path.as_slice()),
            expected: "finite number".into(),
            found: "non-finite number",
        }),
        DocumentError::Custom(msg) => RepoError::Serialization(msg),
    })
}

fn from_document<T: DeserializeOwned>(document: Value) -> RepoResult<T> {
    Ok(serde_json::from_value(document)?)
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            key: self.key.clone(),
            ttl: self.ttl,
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("model", &self.model.name())
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish()
    }
}
