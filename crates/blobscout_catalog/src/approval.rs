//! Approval workflow operations.
//!
//! These only touch the approval sub-state of a record (`status`,
//! `approval_status`, `is_visible`, `approval_workflow`, `reviewed_at`).
//! Content fields belong to the discovery engine.

use crate::error::{CatalogError, Result};
use crate::store::{row_to_record, RECORD_COLUMNS};
use crate::types::*;
use crate::CatalogDb;
use chrono::Utc;
use sqlx::Row;
use tracing::info;

/// Role recorded when the caller does not name one.
pub const DEFAULT_REVIEWER_ROLE: &str = "data_governor";

const VISIBLE_FILTER: &str = r#"
    is_visible = 1 AND is_active = 1
    AND (?1 IS NULL OR status = ?1)
    AND (?2 IS NULL OR environment = ?2)
    AND (?3 IS NULL OR data_source_type = ?3)
    AND (?4 IS NULL OR file_name LIKE ?4 ESCAPE '\' OR storage_path LIKE ?4 ESCAPE '\')
"#;

impl CatalogDb {
    // ========================================================================
    // Queries
    // ========================================================================

    /// Visible, active records, newest first.
    ///
    /// Malformed paging input is clamped (`page >= 0`, `1 <= size <= 100`)
    /// and filter strings are trimmed and length-limited.
    pub async fn list_visible(&self, filter: &RecordFilter, page: i64, size: i64) -> Result<RecordPage> {
        let filter = filter.normalized();
        let request = PageRequest::clamped(page, size);
        let search = filter.search.as_deref().map(like_pattern);

        let count_sql = format!("SELECT COUNT(*) AS total FROM data_discovery WHERE {}", VISIBLE_FILTER);
        let total: i64 = sqlx::query(&count_sql)
            .bind(&filter.status)
            .bind(&filter.environment)
            .bind(&filter.data_source_type)
            .bind(&search)
            .fetch_one(&self.pool)
            .await?
            .get("total");

        let list_sql = format!(
            "SELECT {} FROM data_discovery WHERE {} ORDER BY discovered_at DESC, id DESC LIMIT ?5 OFFSET ?6",
            RECORD_COLUMNS, VISIBLE_FILTER
        );
        let rows = sqlx::query(&list_sql)
            .bind(&filter.status)
            .bind(&filter.environment)
            .bind(&filter.data_source_type)
            .bind(&search)
            .bind(request.size as i64)
            .bind(request.offset())
            .fetch_all(&self.pool)
            .await?;

        let records = rows.iter().map(row_to_record).collect::<Result<Vec<_>>>()?;
        Ok(RecordPage {
            records,
            pagination: Pagination::new(request, total.max(0) as u64),
        })
    }

    /// Active record by id, visible or not.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<CatalogRecord>> {
        let sql = format!(
            "SELECT {} FROM data_discovery WHERE id = ? AND is_active = 1",
            RECORD_COLUMNS
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_record).transpose()
    }

    /// Status counts over active records.
    pub async fn summary_stats(&self) -> Result<SummaryStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending,
                COALESCE(SUM(CASE WHEN status = 'approved' THEN 1 ELSE 0 END), 0) AS approved,
                COALESCE(SUM(CASE WHEN status = 'rejected' THEN 1 ELSE 0 END), 0) AS rejected
            FROM data_discovery
            WHERE is_active = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(SummaryStats {
            total: row.get::<i64, _>("total") as u64,
            pending: row.get::<i64, _>("pending") as u64,
            approved: row.get::<i64, _>("approved") as u64,
            rejected: row.get::<i64, _>("rejected") as u64,
        })
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Mark a record approved. Visibility is left as it is.
    pub async fn approve(
        &self,
        id: i64,
        approved_by: &str,
        role: Option<&str>,
        comments: Option<&str>,
    ) -> Result<CatalogRecord> {
        let decision = decision(approved_by, role, None, comments)?;
        self.review(id, ReviewAction::Approved, decision).await
    }

    /// Mark a record rejected and hide it from the visible listing.
    pub async fn reject(
        &self,
        id: i64,
        rejected_by: &str,
        reason: Option<&str>,
        role: Option<&str>,
        comments: Option<&str>,
    ) -> Result<CatalogRecord> {
        let decision = decision(rejected_by, role, reason, comments)?;
        self.review(id, ReviewAction::Rejected, decision).await
    }

    async fn review(&self, id: i64, action: ReviewAction, decision: ReviewDecision) -> Result<CatalogRecord> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT status, approval_workflow FROM data_discovery WHERE id = ? AND is_active = 1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CatalogError::not_found(format!("discovery record {}", id)))?;

        let previous_status: RecordStatus = row.get::<String, _>("status").parse()?;
        let mut workflow: ApprovalWorkflow =
            serde_json::from_str(&row.get::<String, _>("approval_workflow"))?;

        let (status, approval_status) = match action {
            ReviewAction::Approved => {
                workflow.approval = Some(decision.clone());
                (RecordStatus::Approved, ApprovalStatus::Approved)
            }
            ReviewAction::Rejected => {
                workflow.rejection = Some(decision.clone());
                (RecordStatus::Rejected, ApprovalStatus::Rejected)
            }
        };
        workflow.history.push(HistoryEntry {
            action,
            previous_status,
            decision: decision.clone(),
        });
        let workflow_json = serde_json::to_string(&workflow)?;

        let sql = match action {
            ReviewAction::Approved => {
                "UPDATE data_discovery SET status = ?, approval_status = ?, approval_workflow = ?, reviewed_at = ? WHERE id = ?"
            }
            ReviewAction::Rejected => {
                "UPDATE data_discovery SET status = ?, approval_status = ?, approval_workflow = ?, reviewed_at = ?, is_visible = 0 WHERE id = ?"
            }
        };
        sqlx::query(sql)
            .bind(status.as_str())
            .bind(approval_status.as_str())
            .bind(&workflow_json)
            .bind(decision.at.timestamp_millis())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let sql = format!("SELECT {} FROM data_discovery WHERE id = ?", RECORD_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_one(&mut *tx).await?;
        let record = row_to_record(&row)?;
        tx.commit().await?;

        info!(
            id,
            by = %decision.by,
            role = %decision.role,
            from = %previous_status,
            to = %status,
            "Discovery record reviewed"
        );
        Ok(record)
    }
}

fn decision(
    by: &str,
    role: Option<&str>,
    reason: Option<&str>,
    comments: Option<&str>,
) -> Result<ReviewDecision> {
    let by = by.trim();
    if by.is_empty() {
        return Err(CatalogError::invalid_input("reviewer must not be empty"));
    }
    let role = role
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REVIEWER_ROLE);
    Ok(ReviewDecision {
        by: by.to_string(),
        role: role.to_string(),
        reason: non_empty(reason),
        comments: non_empty(comments),
        at: Utc::now(),
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `%term%` with LIKE metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
