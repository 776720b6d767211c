use kvshape_store::StoreError;

/// Errors produced while binding, validating, saving, or loading fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A value does not fit its field type. Raised before any command is
    /// queued, so the batch is never partially built.
    #[error("type mismatch at {key}: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: String,
        found: &'static str,
    },

    /// A schema or schema descriptor is malformed.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Stored data could not be decoded (e.g. a non-numeric size sentinel).
    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Failure reported by the store driver, propagated unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SchemaError {
    /// Returns `true` for [`SchemaError::TypeMismatch`].
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;
