/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use hmon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "trigger",
///     id: "trg-99".to_string(),
/// };
/// assert!(err.to_string().contains("trigger"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
