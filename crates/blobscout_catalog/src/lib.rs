//! Discovery catalog for blobscout.
//!
//! One SQLite table holds a record per `(storage_type, storage_identifier,
//! storage_path)` key. Two writers share it and never touch the same
//! columns:
//!
//! - the discovery engine, through [`CatalogStore`] (content fields and
//!   `last_checked_at`/`updated_at`),
//! - the approval workflow, through the methods in [`approval`] (status,
//!   visibility, workflow history and `reviewed_at`).
//!
//! ```rust,ignore
//! use blobscout_catalog::{CatalogDb, RecordFilter};
//!
//! let db = CatalogDb::open("~/.blobscout/catalog.sqlite3").await?;
//! let page = db.list_visible(&RecordFilter::default(), 0, 20).await?;
//! ```

mod error;
mod schema;
mod store;
mod types;

pub mod approval;

pub use error::{CatalogError, Result};
pub use store::CatalogStore;
pub use types::*;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

const POOL_SIZE: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct CatalogDb {
    pool: SqlitePool,
}

impl CatalogDb {
    /// Open the catalog at `path`, creating the file and parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)?,
            _ => {}
        }
        let db = Self::connect(file_options(path).create_if_missing(true)).await?;
        info!(path = %path.display(), "Catalog opened");
        Ok(db)
    }

    /// Open a catalog a previous scan created. A missing file is `NotFound`.
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CatalogError::not_found(format!(
                "Catalog not found: {}",
                path.display()
            )));
        }
        Self::connect(file_options(path)).await
    }

    /// Throwaway catalog for tests. Everything lives on one pinned connection.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;
        Self::prepared(pool).await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await?;
        Self::prepared(pool).await
    }

    async fn prepared(pool: SqlitePool) -> Result<Self> {
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    pub(crate) fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    pub(crate) fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }
}

fn file_options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_database() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("catalog.db");

        let db = CatalogDb::open(&db_path).await.unwrap();
        assert!(db_path.exists());
        db.close().await;

        let reopened = CatalogDb::open_existing(&db_path).await.unwrap();
        reopened.close().await;
    }

    #[tokio::test]
    async fn test_missing_catalog_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = CatalogDb::open_existing(tmp.path().join("missing.db")).await;
        assert!(matches!(result, Err(CatalogError::NotFound(_))));
    }
}
