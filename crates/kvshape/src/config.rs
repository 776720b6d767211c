use std::path::Path;

use serde::{Deserialize, Serialize};

use kvshape_schema::Ttl;

use crate::error::{RepoError, RepoResult};

/// Per-repository overrides, usually read from TOML:
///
/// ```toml
/// key = "session:42"
/// ttl = { expire = 900 }
/// ```
///
/// Unset values keep the model's defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub key: Option<String>,
    pub ttl: Option<Ttl>,
}

impl RepositoryConfig {
    pub fn from_toml(text: &str) -> RepoResult<Self> {
        toml::from_str(text).map_err(|e| RepoError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RepoError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }
}
