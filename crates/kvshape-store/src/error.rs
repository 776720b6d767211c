use crate::memory::EntryKind;

/// Errors reported by a key-value store backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A command addressed a key holding a different data type.
    #[error("WRONGTYPE operation against key {key}: holds {actual}, expected {expected}")]
    WrongType {
        key: String,
        expected: EntryKind,
        actual: EntryKind,
    },

    /// A single command inside a batch was malformed.
    #[error("invalid command {command} on {key}: {reason}")]
    InvalidCommand {
        command: &'static str,
        key: String,
        reason: String,
    },

    /// The backend refused to commit the batch.
    #[error("batch rejected: {0}")]
    Rejected(String),

    /// Connectivity or protocol failure in the underlying driver.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
