//! Catalog table creation.

use crate::error::Result;
use crate::CatalogDb;
use tracing::debug;

impl CatalogDb {
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // The UNIQUE constraint on the dedup key is what keeps concurrent
        // scanners from creating duplicate records.
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS data_discovery (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                storage_type TEXT NOT NULL,
                storage_identifier TEXT NOT NULL,
                storage_path TEXT NOT NULL,
                file_name TEXT NOT NULL,
                folder_path TEXT NOT NULL DEFAULT '',
                file_hash TEXT NOT NULL,
                schema_hash TEXT NOT NULL,
                file_metadata TEXT NOT NULL,
                schema_json TEXT NOT NULL,
                storage_metadata TEXT NOT NULL,
                data_classification TEXT NOT NULL DEFAULT 'Internal',
                status TEXT NOT NULL DEFAULT 'pending',
                approval_status TEXT NOT NULL DEFAULT 'pending_review',
                approval_workflow TEXT NOT NULL DEFAULT '{}',
                environment TEXT NOT NULL,
                env_type TEXT NOT NULL,
                data_source_type TEXT NOT NULL,
                created_by TEXT NOT NULL,
                is_visible INTEGER NOT NULL DEFAULT 1,
                is_active INTEGER NOT NULL DEFAULT 1,
                discovered_at INTEGER NOT NULL,
                last_checked_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                reviewed_at INTEGER,
                UNIQUE (storage_type, storage_identifier, storage_path)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_discovery_visible ON data_discovery(is_visible, is_active, discovered_at)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_discovery_status ON data_discovery(status)")
            .execute(&self.pool)
            .await?;

        debug!("Catalog schema verified");
        Ok(())
    }
}
