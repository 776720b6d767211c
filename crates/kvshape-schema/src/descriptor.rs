//! Schemas declared in TOML.
//!
//! ```toml
//! [model]
//! name = "User"
//! key = "user"
//! ttl = { expire = 60 }
//!
//! [model.fields.name]
//! type = "string"
//! required = true
//!
//! [model.fields.home]
//! type = "instance_of"
//! model = "Address"
//!
//! [models.Address]
//! key = "address"
//! fields = { city = { type = "string" } }
//! ```
//!
//! Entries under `[models]` are only compiled when referenced through
//! `instance_of`, and each is compiled once and shared.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};
use crate::key::validate_root_key;
use crate::model::ModelDescriptor;
use crate::spec::{FieldSpec, Schema};
use crate::ttl::Ttl;
use crate::types;

/// Name given to the root model when the file does not set one.
pub const DEFAULT_MODEL_NAME: &str = "Model";

/// A schema file: one root model plus the models it embeds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaFile {
    pub model: ModelDef,
    #[serde(default)]
    pub models: BTreeMap<String, ModelDef>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelDef {
    #[serde(default)]
    pub name: Option<String>,
    pub key: String,
    #[serde(default)]
    pub ttl: Option<Ttl>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(flatten)]
    pub kind: FieldDefKind,
    #[serde(default)]
    pub required: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldDefKind {
    String,
    Number,
    Hash,
    List,
    Set,
    Shape {
        #[serde(default)]
        fields: BTreeMap<String, FieldDef>,
    },
    ListOf {
        item: Box<FieldDef>,
    },
    HashOf {
        item: Box<FieldDef>,
    },
    InstanceOf {
        model: String,
    },
}

impl SchemaFile {
    pub fn from_toml(text: &str) -> SchemaResult<Self> {
        toml::from_str(text).map_err(|e| SchemaError::InvalidSchema(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SchemaError::InvalidSchema(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    /// Compile the root model and everything it embeds.
    pub fn compile(&self) -> SchemaResult<ModelDescriptor> {
        let name = self.model.name.as_deref().unwrap_or(DEFAULT_MODEL_NAME);
        let mut compiler = Compiler {
            defs: &self.models,
            compiled: HashMap::new(),
            visiting: vec![name.to_string()],
        };
        compiler.model(name, &self.model)
    }
}

struct Compiler<'d> {
    defs: &'d BTreeMap<String, ModelDef>,
    compiled: HashMap<String, Arc<ModelDescriptor>>,
    /// Models currently being compiled, outermost first.
    visiting: Vec<String>,
}

impl<'d> Compiler<'d> {
    fn model(&mut self, name: &str, def: &ModelDef) -> SchemaResult<ModelDescriptor> {
        validate_root_key(&def.key)?;
        let mut schema = Schema::new();
        for (field, field_def) in &def.fields {
            schema.insert(field.clone(), self.field(field_def)?);
        }
        let descriptor = ModelDescriptor::new(name, def.key.clone(), schema);
        Ok(match def.ttl {
            Some(ttl) => descriptor.with_ttl(ttl),
            None => descriptor,
        })
    }

    fn field(&mut self, def: &FieldDef) -> SchemaResult<FieldSpec> {
        let spec = match &def.kind {
            FieldDefKind::String => types::string(),
            FieldDefKind::Number => types::number(),
            FieldDefKind::Hash => types::hash(),
            FieldDefKind::List => types::list(),
            FieldDefKind::Set => types::set(),
            FieldDefKind::Shape { fields } => {
                let mut schema = Schema::new();
                for (field, field_def) in fields {
                    schema.insert(field.clone(), self.field(field_def)?);
                }
                types::shape(schema)
            }
            FieldDefKind::ListOf { item } => types::list_of(self.field(item)?),
            FieldDefKind::HashOf { item } => types::hash_of(self.field(item)?),
            FieldDefKind::InstanceOf { model } => types::instance_of(self.reference(model)?),
        };
        Ok(if def.required { spec.required() } else { spec })
    }

    fn reference(&mut self, name: &str) -> SchemaResult<Arc<ModelDescriptor>> {
        if let Some(done) = self.compiled.get(name) {
            return Ok(done.clone());
        }
        if self.visiting.iter().any(|v| v == name) {
            return Err(SchemaError::InvalidSchema(format!(
                "model cycle: {} -> {name}",
                self.visiting.join(" -> ")
            )));
        }
        let defs = self.defs;
        let def = defs
            .get(name)
            .ok_or_else(|| SchemaError::InvalidSchema(format!("unknown model {name:?}")))?;
        let display_name = def.name.as_deref().unwrap_or(name);

        self.visiting.push(name.to_string());
        let compiled = self.model(display_name, def);
        self.visiting.pop();

        let compiled = Arc::new(compiled?);
        self.compiled.insert(name.to_string(), compiled.clone());
        Ok(compiled)
    }
}
