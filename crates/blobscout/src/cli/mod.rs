//! CLI commands for blobscout

pub mod catalog;
pub mod error;
pub mod inspect;
pub mod output;
pub mod resolve;
pub mod scan;

use anyhow::{Context, Result};
use blobscout::DiscoveryConfig;
use std::path::{Path, PathBuf};

/// Runtime for one command invocation.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

/// Catalog path: `--db`, then the config file's, then the default.
pub fn database_path(explicit: Option<PathBuf>, config: Option<&DiscoveryConfig>) -> PathBuf {
    explicit
        .or_else(|| config.map(|c| c.database_path.clone()))
        .unwrap_or_else(|| DiscoveryConfig::default().database_path)
}

pub fn require_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(error::HelpfulError::file_not_found(path).into());
    }
    Ok(())
}
