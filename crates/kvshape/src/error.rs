use std::fmt;

use thiserror::Error;

use kvshape_schema::SchemaError;
use kvshape_store::StoreError;

/// Which step of a commit failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitStage {
    /// The store rejected the batch and the discard that followed succeeded.
    Exec,
    /// The store rejected the batch and discarding it failed as well.
    Discard,
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exec => write!(f, "exec"),
            Self::Discard => write!(f, "discard"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("batch commit failed at {stage}: {source}")]
    BatchCommit {
        stage: CommitStage,
        #[source]
        source: StoreError,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("config error: {0}")]
    Config(String),
}

impl RepoError {
    /// Returns `true` when the value did not fit the model's schema.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::Schema(e) if e.is_type_mismatch())
    }
}

impl From<StoreError> for RepoError {
    fn from(err: StoreError) -> Self {
        Self::Schema(SchemaError::Store(err))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
