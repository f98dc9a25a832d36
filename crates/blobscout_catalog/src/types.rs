//! Catalog record types.

use crate::error::CatalogError;
use blobscout_protocol::{
    DataClassification, FileMetadata, SchemaDescriptor, StorageMetadata,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dedup key: at most one record exists per triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub storage_type: String,
    pub storage_identifier: String,
    pub storage_path: String,
}

impl RecordKey {
    pub fn new(
        storage_type: impl Into<String>,
        storage_identifier: impl Into<String>,
        storage_path: impl Into<String>,
    ) -> Self {
        Self {
            storage_type: storage_type.into(),
            storage_identifier: storage_identifier.into(),
            storage_path: storage_path.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/{}",
            self.storage_type, self.storage_identifier, self.storage_path
        )
    }
}

/// Workflow status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Approved,
    Rejected,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Approved => "approved",
            RecordStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecordStatus::Pending),
            "approved" => Ok(RecordStatus::Approved),
            "rejected" => Ok(RecordStatus::Rejected),
            other => Err(CatalogError::invalid_state(format!("unknown status '{}'", other))),
        }
    }
}

/// Review state shown to governors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::PendingReview => "pending_review",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_review" => Ok(ApprovalStatus::PendingReview),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(CatalogError::invalid_state(format!(
                "unknown approval status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approved,
    Rejected,
}

/// One approve/reject decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub by: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub at: DateTime<Utc>,
}

/// Append-only history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: ReviewAction,
    pub previous_status: RecordStatus,
    #[serde(flatten)]
    pub decision: ReviewDecision,
}

/// Approval sub-state persisted as the `approval_workflow` blob.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ReviewDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<ReviewDecision>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Normalized content of a record as produced by the discovery engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub key: RecordKey,
    pub file_name: String,
    pub folder_path: String,
    pub file_hash: String,
    pub schema_hash: String,
    pub file_metadata: FileMetadata,
    pub schema: SchemaDescriptor,
    pub storage_metadata: StorageMetadata,
    pub data_classification: DataClassification,
    pub environment: String,
    pub env_type: String,
    pub data_source_type: String,
}

/// Fields rewritten on a content change. Never includes workflow fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentUpdate {
    pub file_name: String,
    pub folder_path: String,
    pub file_hash: String,
    pub schema_hash: String,
    pub file_metadata: FileMetadata,
    pub schema: SchemaDescriptor,
    pub storage_metadata: StorageMetadata,
    pub data_classification: DataClassification,
}

impl From<&RecordDraft> for ContentUpdate {
    fn from(draft: &RecordDraft) -> Self {
        Self {
            file_name: draft.file_name.clone(),
            folder_path: draft.folder_path.clone(),
            file_hash: draft.file_hash.clone(),
            schema_hash: draft.schema_hash.clone(),
            file_metadata: draft.file_metadata.clone(),
            schema: draft.schema.clone(),
            storage_metadata: draft.storage_metadata.clone(),
            data_classification: draft.data_classification,
        }
    }
}

/// A persisted catalog record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRecord {
    pub id: i64,
    #[serde(flatten)]
    pub key: RecordKey,
    pub file_name: String,
    pub folder_path: String,
    pub file_hash: String,
    pub schema_hash: String,
    pub file_metadata: FileMetadata,
    #[serde(rename = "schema_json")]
    pub schema: SchemaDescriptor,
    pub storage_metadata: StorageMetadata,
    pub data_classification: DataClassification,
    pub status: RecordStatus,
    pub approval_status: ApprovalStatus,
    pub approval_workflow: ApprovalWorkflow,
    pub environment: String,
    pub env_type: String,
    pub data_source_type: String,
    pub created_by: String,
    pub is_visible: bool,
    pub is_active: bool,
    pub discovered_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Filters accepted by `list_visible`. Inputs are normalized, never rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub status: Option<String>,
    pub environment: Option<String>,
    pub data_source_type: Option<String>,
    /// Substring over file name or storage path.
    pub search: Option<String>,
}

impl RecordFilter {
    pub const MAX_STATUS_LEN: usize = 50;
    pub const MAX_ENVIRONMENT_LEN: usize = 50;
    pub const MAX_DATA_SOURCE_TYPE_LEN: usize = 100;
    pub const MAX_SEARCH_LEN: usize = 500;

    /// Trim every field, drop empty ones, cut over-long ones.
    pub fn normalized(&self) -> Self {
        Self {
            status: clean(self.status.as_deref(), Self::MAX_STATUS_LEN),
            environment: clean(self.environment.as_deref(), Self::MAX_ENVIRONMENT_LEN),
            data_source_type: clean(self.data_source_type.as_deref(), Self::MAX_DATA_SOURCE_TYPE_LEN),
            search: clean(self.search.as_deref(), Self::MAX_SEARCH_LEN),
        }
    }
}

fn clean(value: Option<&str>, max_chars: usize) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

/// Zero-based page request, clamped to `page >= 0` and `1 <= size <= 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const MAX_SIZE: u32 = 100;
    pub const DEFAULT_SIZE: u32 = 20;

    pub fn clamped(page: i64, size: i64) -> Self {
        Self {
            page: page.clamp(0, u32::MAX as i64) as u32,
            size: size.clamp(1, Self::MAX_SIZE as i64) as u32,
        }
    }

    pub fn offset(&self) -> i64 {
        self.page as i64 * self.size as i64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: Self::DEFAULT_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub size: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(request: PageRequest, total: u64) -> Self {
        let size = request.size as u64;
        let total_pages = total.div_ceil(size);
        Self {
            page: request.page,
            size: request.size,
            total,
            total_pages,
            has_next: (request.page as u64) + 1 < total_pages,
            has_prev: request.page > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordPage {
    pub records: Vec<CatalogRecord>,
    pub pagination: Pagination,
}

/// Counts over active records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SummaryStats {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_out_of_range_input() {
        assert_eq!(PageRequest::clamped(-3, 0), PageRequest { page: 0, size: 1 });
        assert_eq!(PageRequest::clamped(2, 500), PageRequest { page: 2, size: 100 });
        assert_eq!(PageRequest::clamped(1, -7).offset(), 1);
    }

    #[test]
    fn pagination_flags() {
        let first = Pagination::new(PageRequest::clamped(0, 10), 25);
        assert_eq!(first.total_pages, 3);
        assert!(first.has_next);
        assert!(!first.has_prev);

        let last = Pagination::new(PageRequest::clamped(2, 10), 25);
        assert!(!last.has_next);
        assert!(last.has_prev);

        let empty = Pagination::new(PageRequest::default(), 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }

    #[test]
    fn filter_is_trimmed_and_truncated() {
        let filter = RecordFilter {
            status: Some("  pending ".to_string()),
            environment: Some("   ".to_string()),
            data_source_type: None,
            search: Some("x".repeat(800)),
        }
        .normalized();

        assert_eq!(filter.status.as_deref(), Some("pending"));
        assert_eq!(filter.environment, None);
        assert_eq!(filter.search.map(|s| s.len()), Some(RecordFilter::MAX_SEARCH_LEN));
    }

    #[test]
    fn workflow_blob_round_trips() {
        let decision = ReviewDecision {
            by: "alice".to_string(),
            role: "data_governor".to_string(),
            reason: None,
            comments: Some("ok".to_string()),
            at: Utc::now(),
        };
        let workflow = ApprovalWorkflow {
            approval: Some(decision.clone()),
            rejection: None,
            history: vec![HistoryEntry {
                action: ReviewAction::Approved,
                previous_status: RecordStatus::Pending,
                decision,
            }],
        };
        let json = serde_json::to_string(&workflow).unwrap();
        let back: ApprovalWorkflow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, workflow);
    }
}
