//! Error types for the discovery engine

use blobscout_catalog::CatalogError;
use blobscout_protocol::ProtocolError;
use std::io;
use thiserror::Error;

/// Discovery error type
///
/// Missing samples and failed schema extraction are not errors: they
/// degrade to "schema unknown" and are reported on the extraction result.
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Unrecognized storage locator: {0}")]
    UnrecognizedLocatorFormat(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("Listing failed for {target}: {message}")]
    ListingFailure { target: String, message: String },

    #[error("Authentication failed for account '{account}': {message}")]
    Authentication { account: String, message: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("Persistence error: {0}")]
    Persistence(#[from] CatalogError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Schema inference failed: {0}")]
    SchemaInference(String),
}

impl ScoutError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    pub fn authentication(account: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            account: account.into(),
            message: message.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ScoutError>;
