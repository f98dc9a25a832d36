//! `scan` - one discovery pass over the configured accounts

use crate::cli::output::{print_json, print_table};
use crate::cli::{database_path, require_file, runtime};
use anyhow::{Context, Result};
use blobscout::backend::DefaultBackendFactory;
use blobscout::{DiscoveryConfig, ScanCancelToken, ScanConfig, ScanReport, Scanner};
use blobscout_catalog::CatalogDb;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct ScanArgs {
    pub config: PathBuf,
    pub db: Option<PathBuf>,
    pub json: bool,
}

pub fn run(args: ScanArgs) -> Result<()> {
    require_file(&args.config)?;
    let config = DiscoveryConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    let db_path = database_path(args.db, Some(&config));

    let report = runtime()?.block_on(async {
        let db = CatalogDb::open(&db_path)
            .await
            .with_context(|| format!("Failed to open catalog {}", db_path.display()))?;

        let cancel = ScanCancelToken::new();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing objects in flight");
                ctrl_c.cancel();
            }
        });

        let scanner = Scanner::new(
            Arc::new(db.clone()),
            Arc::new(DefaultBackendFactory),
            ScanConfig::from(&config),
        );
        let report = scanner.scan(&config.accounts, &cancel).await;
        db.close().await;
        anyhow::Ok(report)
    })?;

    info!(db = %db_path.display(), "Scan finished");
    if args.json {
        print_json(&report)
    } else {
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &ScanReport) {
    let s = &report.stats;
    let rows = [
        ("Accounts scanned", s.accounts_scanned),
        ("Accounts skipped", s.accounts_skipped),
        ("Targets scanned", s.targets_scanned),
        ("Listing failures", s.listing_failures),
        ("Partial listings", s.partial_listings),
        ("Objects seen", s.objects_seen),
        ("Inserted", s.inserted),
        ("Updated", s.updated),
        ("Unchanged", s.unchanged),
        ("Degraded schema", s.degraded),
        ("Failed", s.failed),
    ]
    .iter()
    .map(|(label, value)| vec![label.to_string(), value.to_string()])
    .collect();
    print_table(&["METRIC", "COUNT"], rows);

    if !report.issues.is_empty() {
        println!();
        println!("ISSUES:");
        for issue in &report.issues {
            println!("  {}: {}", issue.location, issue.message);
        }
    }
    if report.cancelled {
        println!();
        println!("Scan was interrupted; later objects were not visited.");
    }
    println!();
    println!("Completed in {:.1}s", report.duration_ms as f64 / 1000.0);
}
