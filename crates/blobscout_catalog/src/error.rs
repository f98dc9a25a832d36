//! Error types for the catalog layer.

use thiserror::Error;

/// Catalog operation result type.
pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No record with the given id (or the database file is missing).
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record with the same dedup key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Stored value that does not map onto the typed model.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::DuplicateKey(db_err.message().to_string());
            }
        }
        Self::Sqlx(err)
    }
}
