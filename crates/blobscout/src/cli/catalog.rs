//! `catalog` - review discovered records

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_size, format_timestamp, print_json, print_table};
use crate::cli::{database_path, runtime};
use anyhow::{Context, Result};
use blobscout_catalog::{CatalogDb, CatalogError, CatalogRecord, RecordFilter};
use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum CatalogAction {
    /// List visible records, newest first
    List {
        /// pending, approved or rejected
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        environment: Option<String>,
        #[arg(long)]
        data_source_type: Option<String>,
        /// Substring of the file name or storage path
        #[arg(short, long)]
        search: Option<String>,
        /// Zero-based page
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        page: i64,
        #[arg(long, default_value = "20", allow_negative_numbers = true)]
        size: i64,
        #[arg(long)]
        json: bool,
    },

    /// Show one record with its schema and review history
    Show { id: i64 },

    /// Approve a record
    Approve {
        id: i64,
        #[arg(long)]
        by: String,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        comments: Option<String>,
    },

    /// Reject a record and hide it from the listing
    Reject {
        id: i64,
        #[arg(long)]
        by: String,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        comments: Option<String>,
    },

    /// Record counts by status
    Stats {
        #[arg(long)]
        json: bool,
    },
}

impl CatalogAction {
    pub fn wants_json(&self) -> bool {
        match self {
            CatalogAction::List { json, .. } | CatalogAction::Stats { json } => *json,
            CatalogAction::Show { .. } | CatalogAction::Approve { .. } | CatalogAction::Reject { .. } => true,
        }
    }
}

pub fn run(action: CatalogAction, db: Option<PathBuf>) -> Result<()> {
    let db_path = database_path(db, None);
    runtime()?.block_on(async {
        let db = match CatalogDb::open_existing(&db_path).await {
            Ok(db) => db,
            Err(e) if e.is_not_found() => return Err(HelpfulError::catalog_not_found(&db_path).into()),
            Err(e) => return Err(e).context("Failed to open catalog"),
        };
        let result = execute(&db, action).await;
        db.close().await;
        result
    })
}

async fn execute(db: &CatalogDb, action: CatalogAction) -> Result<()> {
    match action {
        CatalogAction::List {
            status,
            environment,
            data_source_type,
            search,
            page,
            size,
            json,
        } => {
            let filter = RecordFilter {
                status,
                environment,
                data_source_type,
                search,
            };
            let listing = db.list_visible(&filter, page, size).await?;
            if json {
                return print_json(&listing);
            }

            let rows = listing.records.iter().map(summary_row).collect();
            print_table(
                &["ID", "STATUS", "CLASSIFICATION", "TYPE", "PATH", "SIZE", "DISCOVERED"],
                rows,
            );
            let p = &listing.pagination;
            println!(
                "Page {} of {} ({} records)",
                p.page + 1,
                p.total_pages.max(1),
                p.total
            );
            Ok(())
        }
        CatalogAction::Show { id } => match db.get_by_id(id).await? {
            Some(record) => print_json(&record),
            None => Err(HelpfulError::record_not_found(id).into()),
        },
        CatalogAction::Approve {
            id,
            by,
            role,
            comments,
        } => {
            let result = db
                .approve(id, &by, role.as_deref(), comments.as_deref())
                .await;
            print_json(&reviewed(id, result)?)
        }
        CatalogAction::Reject {
            id,
            by,
            reason,
            role,
            comments,
        } => {
            let result = db
                .reject(id, &by, reason.as_deref(), role.as_deref(), comments.as_deref())
                .await;
            print_json(&reviewed(id, result)?)
        }
        CatalogAction::Stats { json } => {
            let stats = db.summary_stats().await?;
            if json {
                return print_json(&stats);
            }
            print_table(
                &["TOTAL", "PENDING", "APPROVED", "REJECTED"],
                vec![vec![
                    stats.total.to_string(),
                    stats.pending.to_string(),
                    stats.approved.to_string(),
                    stats.rejected.to_string(),
                ]],
            );
            Ok(())
        }
    }
}

fn reviewed(id: i64, result: blobscout_catalog::Result<CatalogRecord>) -> Result<CatalogRecord> {
    match result {
        Ok(record) => Ok(record),
        Err(CatalogError::NotFound(_)) => Err(HelpfulError::record_not_found(id).into()),
        Err(e) => Err(e.into()),
    }
}

fn summary_row(record: &CatalogRecord) -> Vec<String> {
    vec![
        record.id.to_string(),
        record.status.to_string(),
        record.data_classification.to_string(),
        record.file_metadata.file_format.to_string(),
        record.key.storage_path.clone(),
        format_size(record.file_metadata.file_size),
        format_timestamp(&record.discovered_at),
    ]
}
