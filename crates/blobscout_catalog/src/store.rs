//! Discovery-side catalog operations.

use crate::error::{CatalogError, Result};
use crate::types::*;
use crate::CatalogDb;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Creator recorded on rows inserted by the discovery engine.
pub const DISCOVERY_CREATOR: &str = "blobscout";

/// Persistence operations the discovery engine depends on.
///
/// Every method is a single-record transaction. `insert` must fail with
/// [`CatalogError::DuplicateKey`] when the key already exists.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_by_key(&self, key: &RecordKey) -> Result<Option<CatalogRecord>>;

    async fn insert(&self, draft: &RecordDraft) -> Result<i64>;

    async fn update_content(&self, id: i64, update: &ContentUpdate) -> Result<()>;

    async fn touch_last_checked(&self, id: i64) -> Result<()>;
}

pub(crate) const RECORD_COLUMNS: &str = "id, storage_type, storage_identifier, storage_path, \
    file_name, folder_path, file_hash, schema_hash, file_metadata, schema_json, storage_metadata, \
    data_classification, status, approval_status, approval_workflow, environment, env_type, \
    data_source_type, created_by, is_visible, is_active, discovered_at, last_checked_at, \
    created_at, updated_at, reviewed_at";

#[async_trait]
impl CatalogStore for CatalogDb {
    async fn find_by_key(&self, key: &RecordKey) -> Result<Option<CatalogRecord>> {
        let sql = format!(
            "SELECT {} FROM data_discovery WHERE storage_type = ? AND storage_identifier = ? AND storage_path = ?",
            RECORD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&key.storage_type)
            .bind(&key.storage_identifier)
            .bind(&key.storage_path)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn insert(&self, draft: &RecordDraft) -> Result<i64> {
        let file_metadata = serde_json::to_string(&draft.file_metadata)?;
        let schema_json = serde_json::to_string(&draft.schema)?;
        let storage_metadata = serde_json::to_string(&draft.storage_metadata)?;
        let workflow = serde_json::to_string(&ApprovalWorkflow::default())?;
        let now = Self::now_millis();

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO data_discovery (
                storage_type, storage_identifier, storage_path, file_name, folder_path,
                file_hash, schema_hash, file_metadata, schema_json, storage_metadata,
                data_classification, status, approval_status, approval_workflow,
                environment, env_type, data_source_type, created_by, is_visible, is_active,
                discovered_at, last_checked_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, 1, ?, ?, ?, ?)
            "#,
        )
        .bind(&draft.key.storage_type)
        .bind(&draft.key.storage_identifier)
        .bind(&draft.key.storage_path)
        .bind(&draft.file_name)
        .bind(&draft.folder_path)
        .bind(&draft.file_hash)
        .bind(&draft.schema_hash)
        .bind(&file_metadata)
        .bind(&schema_json)
        .bind(&storage_metadata)
        .bind(draft.data_classification.as_str())
        .bind(RecordStatus::Pending.as_str())
        .bind(ApprovalStatus::PendingReview.as_str())
        .bind(&workflow)
        .bind(&draft.environment)
        .bind(&draft.env_type)
        .bind(&draft.data_source_type)
        .bind(DISCOVERY_CREATOR)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|err| match CatalogError::from(err) {
            CatalogError::DuplicateKey(_) => CatalogError::DuplicateKey(draft.key.to_string()),
            other => other,
        })?;
        tx.commit().await?;

        Ok(result.last_insert_rowid())
    }

    async fn update_content(&self, id: i64, update: &ContentUpdate) -> Result<()> {
        let file_metadata = serde_json::to_string(&update.file_metadata)?;
        let schema_json = serde_json::to_string(&update.schema)?;
        let storage_metadata = serde_json::to_string(&update.storage_metadata)?;
        let now = Self::now_millis();

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE data_discovery SET
                file_name = ?,
                folder_path = ?,
                file_hash = ?,
                schema_hash = ?,
                file_metadata = ?,
                schema_json = ?,
                storage_metadata = ?,
                data_classification = ?,
                last_checked_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.file_name)
        .bind(&update.folder_path)
        .bind(&update.file_hash)
        .bind(&update.schema_hash)
        .bind(&file_metadata)
        .bind(&schema_json)
        .bind(&storage_metadata)
        .bind(update.data_classification.as_str())
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(CatalogError::not_found(format!("discovery record {}", id)));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn touch_last_checked(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE data_discovery SET last_checked_at = ? WHERE id = ?")
            .bind(Self::now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::not_found(format!("discovery record {}", id)));
        }
        Ok(())
    }
}

pub(crate) fn row_to_record(row: &SqliteRow) -> Result<CatalogRecord> {
    let file_metadata: String = row.get("file_metadata");
    let schema_json: String = row.get("schema_json");
    let storage_metadata: String = row.get("storage_metadata");
    let workflow: String = row.get("approval_workflow");
    let classification: String = row.get("data_classification");
    let status: String = row.get("status");
    let approval_status: String = row.get("approval_status");

    Ok(CatalogRecord {
        id: row.get("id"),
        key: RecordKey {
            storage_type: row.get("storage_type"),
            storage_identifier: row.get("storage_identifier"),
            storage_path: row.get("storage_path"),
        },
        file_name: row.get("file_name"),
        folder_path: row.get("folder_path"),
        file_hash: row.get("file_hash"),
        schema_hash: row.get("schema_hash"),
        file_metadata: serde_json::from_str(&file_metadata)?,
        schema: serde_json::from_str(&schema_json)?,
        storage_metadata: serde_json::from_str(&storage_metadata)?,
        data_classification: classification
            .parse()
            .map_err(|e| CatalogError::invalid_state(format!("{}", e)))?,
        status: status.parse()?,
        approval_status: approval_status.parse()?,
        approval_workflow: serde_json::from_str(&workflow)?,
        environment: row.get("environment"),
        env_type: row.get("env_type"),
        data_source_type: row.get("data_source_type"),
        created_by: row.get("created_by"),
        is_visible: row.get("is_visible"),
        is_active: row.get("is_active"),
        discovered_at: CatalogDb::millis_to_datetime(row.get("discovered_at")),
        last_checked_at: CatalogDb::millis_to_datetime(row.get("last_checked_at")),
        created_at: CatalogDb::millis_to_datetime(row.get("created_at")),
        updated_at: CatalogDb::millis_to_datetime(row.get("updated_at")),
        reviewed_at: row
            .get::<Option<i64>, _>("reviewed_at")
            .map(CatalogDb::millis_to_datetime),
    })
}
