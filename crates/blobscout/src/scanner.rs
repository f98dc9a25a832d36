//! Discovery scan driver
//!
//! Walks accounts → targets → objects, each level as a bounded pool of
//! concurrent futures. Every object runs the same pipeline:
//!
//! - fingerprint, sample and extract a schema (never fails, may degrade)
//! - classify columns for PII
//! - assemble the record and hand it to the dedup engine
//!
//! Failures are contained at the level they happen: an object that cannot
//! be persisted is logged and skipped, a listing failure skips its target,
//! an authentication failure skips its account. The scan itself never
//! returns an error.

use crate::backend::{BackendFactory, StorageBackend};
use crate::config::{AccountConfig, DiscoveryConfig, SamplingConfig};
use crate::dedup::{DedupEngine, DedupOutcome};
use crate::error::{Result, ScoutError};
use crate::lister::{lister_for, ListingItem};
use crate::metadata::{build_draft, ObjectAnalyzer};
use crate::pii::PiiClassifier;
use crate::sampler::{SamplePolicy, Sampler};
use crate::schema::ExtractOptions;
use crate::types::StorageTarget;
use blobscout_catalog::CatalogStore;
use blobscout_protocol::ObjectDescriptor;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Configuration for scanning operations
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Objects processed concurrently per target
    pub workers: usize,
    /// Accounts, and targets within an account, processed concurrently
    pub max_concurrent_targets: usize,
    /// Upper bound for any single backend call
    pub backend_timeout: Duration,
    /// Refresh `last_checked_at` on unchanged records
    pub touch_on_unchanged: bool,
    pub sampling: SamplingConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from(&DiscoveryConfig::default())
    }
}

impl From<&DiscoveryConfig> for ScanConfig {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            max_concurrent_targets: config.max_concurrent_targets.max(1),
            backend_timeout: config.backend_timeout(),
            touch_on_unchanged: config.touch_on_unchanged,
            sampling: config.sampling.clone(),
        }
    }
}

/// Cooperative cancellation for an in-flight scan.
///
/// Checked before each account, target and object. Objects already in the
/// pipeline finish; nothing new is started.
#[derive(Debug, Clone, Default)]
pub struct ScanCancelToken(Arc<AtomicBool>);

impl ScanCancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct ScanCounters {
    accounts_scanned: AtomicU64,
    accounts_skipped: AtomicU64,
    targets_scanned: AtomicU64,
    listing_failures: AtomicU64,
    partial_listings: AtomicU64,
    objects_seen: AtomicU64,
    inserted: AtomicU64,
    updated: AtomicU64,
    unchanged: AtomicU64,
    degraded: AtomicU64,
    failed: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Counters and issues for one `scan()` call.
#[derive(Debug, Default)]
struct ScanRun {
    counters: ScanCounters,
    issues: Mutex<Vec<ScanIssue>>,
}

impl ScanRun {
    fn record_issue(&self, location: &str, error: &ScoutError) {
        let issue = ScanIssue {
            location: location.to_string(),
            message: error.to_string(),
        };
        match self.issues.lock() {
            Ok(mut issues) => issues.push(issue),
            Err(poisoned) => poisoned.into_inner().push(issue),
        }
    }

    fn into_issues(self) -> Vec<ScanIssue> {
        self.issues
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ScanCounters {
    fn snapshot(&self) -> ScanStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        ScanStats {
            accounts_scanned: get(&self.accounts_scanned),
            accounts_skipped: get(&self.accounts_skipped),
            targets_scanned: get(&self.targets_scanned),
            listing_failures: get(&self.listing_failures),
            partial_listings: get(&self.partial_listings),
            objects_seen: get(&self.objects_seen),
            inserted: get(&self.inserted),
            updated: get(&self.updated),
            unchanged: get(&self.unchanged),
            degraded: get(&self.degraded),
            failed: get(&self.failed),
        }
    }
}

/// Scan statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub accounts_scanned: u64,
    /// Accounts whose backend could not be connected
    pub accounts_skipped: u64,
    pub targets_scanned: u64,
    pub listing_failures: u64,
    /// Listings cut short by the per-call cap
    pub partial_listings: u64,
    pub objects_seen: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Objects recorded with an unknown or partial schema
    pub degraded: u64,
    /// Objects that could not be persisted
    pub failed: u64,
}

/// Something that went wrong during a scan, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanIssue {
    pub location: String,
    pub message: String,
}

/// Result of a scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub stats: ScanStats,
    pub issues: Vec<ScanIssue>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Discovery scanner
pub struct Scanner {
    factory: Arc<dyn BackendFactory>,
    engine: DedupEngine,
    classifier: PiiClassifier,
    config: ScanConfig,
}

impl Scanner {
    pub fn new(store: Arc<dyn CatalogStore>, factory: Arc<dyn BackendFactory>, config: ScanConfig) -> Self {
        Self {
            factory,
            engine: DedupEngine::new(store, config.touch_on_unchanged),
            classifier: PiiClassifier::local(),
            config,
        }
    }

    /// Use a classifier with an external recognizer instead of the local one.
    pub fn with_classifier(mut self, classifier: PiiClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Run one discovery pass over `accounts`. The report covers this pass only.
    pub async fn scan(&self, accounts: &[AccountConfig], cancel: &ScanCancelToken) -> ScanReport {
        let start = Instant::now();
        let run = ScanRun::default();
        info!(accounts = accounts.len(), workers = self.config.workers, "Starting discovery scan");

        stream::iter(accounts)
            .map(|account| self.scan_account(&run, account, cancel))
            .buffer_unordered(self.config.max_concurrent_targets)
            .collect::<Vec<()>>()
            .await;

        let stats = run.counters.snapshot();
        let duration_ms = start.elapsed().as_millis() as u64;
        let cancelled = cancel.is_cancelled();
        info!(
            targets = stats.targets_scanned,
            objects = stats.objects_seen,
            inserted = stats.inserted,
            updated = stats.updated,
            unchanged = stats.unchanged,
            degraded = stats.degraded,
            failed = stats.failed,
            accounts_skipped = stats.accounts_skipped,
            cancelled,
            duration_ms,
            "Discovery scan complete"
        );

        ScanReport {
            stats,
            issues: run.into_issues(),
            cancelled,
            duration_ms,
        }
    }

    async fn scan_account(&self, run: &ScanRun, account: &AccountConfig, cancel: &ScanCancelToken) {
        if cancel.is_cancelled() {
            return;
        }

        let backend = match self.connect(account).await {
            Ok(backend) => backend,
            Err(e) => {
                warn!(account = %account.name, error = %e, "Skipping account");
                bump(&run.counters.accounts_skipped);
                run.record_issue(&account.name, &e);
                return;
            }
        };
        bump(&run.counters.accounts_scanned);

        let targets = account.targets();
        debug!(account = %account.name, backend = backend.name(), targets = targets.len(), "Account connected");

        stream::iter(targets.iter())
            .map(|target| self.scan_target(run, backend.clone(), target, cancel))
            .buffer_unordered(self.config.max_concurrent_targets)
            .collect::<Vec<()>>()
            .await;
    }

    async fn connect(&self, account: &AccountConfig) -> Result<Arc<dyn StorageBackend>> {
        let secs = self.config.backend_timeout.as_secs();
        timeout(self.config.backend_timeout, self.factory.connect(account))
            .await
            .map_err(|_| ScoutError::authentication(&account.name, format!("connect timed out after {}s", secs)))?
    }

    async fn scan_target(
        &self,
        run: &ScanRun,
        backend: Arc<dyn StorageBackend>,
        target: &StorageTarget,
        cancel: &ScanCancelToken,
    ) {
        if cancel.is_cancelled() {
            return;
        }
        bump(&run.counters.targets_scanned);
        info!(target = %target, "Scanning target");

        let call_timeout = self.config.backend_timeout;
        let lister = lister_for(target.backend, backend.clone(), call_timeout);
        let sampler = Sampler::new(
            backend,
            SamplePolicy::from_config(target.backend, &self.config.sampling),
            call_timeout,
        );
        let analyzer = ObjectAnalyzer::new(
            sampler,
            self.classifier.clone(),
            ExtractOptions {
                capture_sample_values: self.config.sampling.capture_sample_values,
            },
        );

        lister
            .list_objects(target)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .filter_map(|item| futures::future::ready(self.accept_item(run, target, item)))
            .map(|object| self.process_object(run, &analyzer, target, object))
            .buffer_unordered(self.config.workers)
            .collect::<Vec<()>>()
            .await;
    }

    fn accept_item(&self, run: &ScanRun, target: &StorageTarget, item: Result<ListingItem>) -> Option<ObjectDescriptor> {
        match item {
            Ok(ListingItem::Object(object)) => {
                bump(&run.counters.objects_seen);
                Some(object)
            }
            Ok(ListingItem::Partial(partial)) => {
                warn!(target = %partial.target, limit = partial.limit, "Listing truncated at cap");
                bump(&run.counters.partial_listings);
                None
            }
            Err(e) => {
                warn!(target = %target, error = %e, "Listing failed, skipping target");
                bump(&run.counters.listing_failures);
                run.record_issue(&target.to_string(), &e);
                None
            }
        }
    }

    async fn process_object(
        &self,
        run: &ScanRun,
        analyzer: &ObjectAnalyzer,
        target: &StorageTarget,
        object: ObjectDescriptor,
    ) {
        let analysis = analyzer.analyze(&target.container, &object).await;
        if let Some(reason) = &analysis.sample.degraded {
            debug!(path = %object.full_path, reason = %reason, "Schema degraded");
            bump(&run.counters.degraded);
        }

        let result = match build_draft(target, &object, &analysis) {
            Ok(draft) => self.engine.apply(&draft).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(DedupOutcome::Inserted { .. }) => bump(&run.counters.inserted),
            Ok(DedupOutcome::Updated { .. }) => bump(&run.counters.updated),
            Ok(DedupOutcome::Unchanged { .. }) => bump(&run.counters.unchanged),
            Err(e) => {
                warn!(target = %target, path = %object.full_path, error = %e, "Failed to record object");
                bump(&run.counters.failed);
                run.record_issue(&format!("{}/{}", target.container, object.full_path), &e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, StaticBackendFactory};
    use crate::config::AuthConfig;
    use blobscout_catalog::CatalogDb;
    use blobscout_protocol::StorageKind;

    fn account(name: &str, kind: StorageKind, containers: &[&str]) -> AccountConfig {
        AccountConfig {
            name: name.to_string(),
            kind,
            auth: AuthConfig::ConnectionString {
                connection_string: format!("AccountName={}", name),
            },
            containers: containers.iter().map(|c| c.to_string()).collect(),
            folders: vec![],
            file_extensions: None,
            environment: "dev".to_string(),
            env_type: "development".to_string(),
            data_source_type: "azure_blob_storage".to_string(),
            locators: vec![],
        }
    }

    fn config() -> ScanConfig {
        ScanConfig {
            workers: 4,
            max_concurrent_targets: 2,
            backend_timeout: Duration::from_secs(5),
            touch_on_unchanged: true,
            sampling: SamplingConfig::default(),
        }
    }

    #[tokio::test]
    async fn failures_are_contained_per_level() {
        let backend = Arc::new(MemoryBackend::new());
        backend.put("good", "a.csv", b"id,email\n1,a@b.io\n".to_vec());
        backend.put("good", "b.json", br#"{"k": 1}"#.to_vec());
        backend.put("bad", "c.csv", b"x\n1\n".to_vec());
        backend.fail_listing("bad");

        let factory = StaticBackendFactory::new().with_backend("acct", backend);
        let db = CatalogDb::open_in_memory().await.unwrap();
        let scanner = Scanner::new(Arc::new(db), Arc::new(factory), config());

        let accounts = vec![
            account("acct", StorageKind::Blob, &["good", "bad"]),
            account("unknown", StorageKind::Blob, &["x"]),
        ];
        let report = scanner.scan(&accounts, &ScanCancelToken::new()).await;

        assert_eq!(report.stats.accounts_scanned, 1);
        assert_eq!(report.stats.accounts_skipped, 1);
        assert_eq!(report.stats.targets_scanned, 2);
        assert_eq!(report.stats.listing_failures, 1);
        assert_eq!(report.stats.inserted, 2);
        assert_eq!(report.stats.failed, 0);
        assert_eq!(report.issues.len(), 2);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn cancelled_scan_starts_nothing() {
        let backend = Arc::new(MemoryBackend::new());
        backend.put("c", "a.csv", b"id\n1\n".to_vec());
        let factory = StaticBackendFactory::new().with_backend("acct", backend.clone());
        let db = CatalogDb::open_in_memory().await.unwrap();
        let scanner = Scanner::new(Arc::new(db), Arc::new(factory), config());

        let cancel = ScanCancelToken::new();
        cancel.cancel();
        let report = scanner
            .scan(&[account("acct", StorageKind::Blob, &["c"])], &cancel)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.stats, ScanStats::default());
        assert_eq!(backend.list_calls(), 0);
    }

    #[test]
    fn config_from_discovery_config_is_bounded() {
        let mut discovery = DiscoveryConfig::default();
        discovery.workers = 0;
        discovery.max_concurrent_targets = 0;
        let config = ScanConfig::from(&discovery);
        assert_eq!(config.workers, 1);
        assert_eq!(config.max_concurrent_targets, 1);
    }
}
