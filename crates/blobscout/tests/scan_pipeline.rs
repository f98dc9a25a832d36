//! End-to-end discovery scans against in-memory and emulated storage.

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use blobscout::backend::{FsEmulatorBackend, MemoryBackend, StaticBackendFactory, StorageBackend};
use blobscout::{AccountConfig, AuthConfig, SamplingConfig, ScanCancelToken, ScanConfig, Scanner};
use blobscout_catalog::{
    ApprovalStatus, CatalogDb, CatalogRecord, CatalogStore, RecordFilter, RecordKey, RecordStatus,
};
use blobscout_protocol::{DataClassification, PiiType, StorageKind};
use chrono::{TimeZone, Utc};
use parquet::arrow::ArrowWriter;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

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
        environment: "prod".to_string(),
        env_type: "production".to_string(),
        data_source_type: "azure_blob_storage".to_string(),
        locators: vec![],
    }
}

fn scan_config(capture_sample_values: bool) -> ScanConfig {
    ScanConfig {
        workers: 4,
        max_concurrent_targets: 2,
        backend_timeout: Duration::from_secs(5),
        touch_on_unchanged: true,
        sampling: SamplingConfig {
            capture_sample_values,
            ..SamplingConfig::default()
        },
    }
}

fn scanner(db: &CatalogDb, account: &str, backend: Arc<dyn StorageBackend>, capture: bool) -> Scanner {
    let factory = StaticBackendFactory::new().with_backend(account, backend);
    Scanner::new(Arc::new(db.clone()), Arc::new(factory), scan_config(capture))
}

async fn record(db: &CatalogDb, storage_type: &str, account: &str, path: &str) -> CatalogRecord {
    db.find_by_key(&RecordKey::new(storage_type, account, path))
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("no record for {}", path))
}

fn column_type(record: &CatalogRecord, name: &str) -> String {
    record.schema.column(name).unwrap().inferred_type.to_string()
}

#[tokio::test]
async fn rescanning_unchanged_objects_creates_no_duplicates() {
    let backend = Arc::new(MemoryBackend::new());
    backend.put("raw", "sales/orders.csv", b"order_id,amount\n1,9.5\n2,3.25\n".to_vec());
    backend.put("raw", "sales/meta.json", br#"{"owner": "finance", "rows": 2}"#.to_vec());
    let db = CatalogDb::open_in_memory().await.unwrap();
    let scanner = scanner(&db, "acct", backend, true);
    let accounts = [account("acct", StorageKind::Blob, &["raw"])];

    let first = scanner.scan(&accounts, &ScanCancelToken::new()).await;
    assert_eq!(first.stats.inserted, 2);
    let before = record(&db, "azure_blob", "acct", "raw/sales/orders.csv").await;

    let second = scanner.scan(&accounts, &ScanCancelToken::new()).await;
    assert_eq!(second.stats.objects_seen, 2);
    assert_eq!(second.stats.inserted, 0);
    assert_eq!(second.stats.unchanged, 2);
    assert_eq!(second.stats.updated, 0);

    let after = record(&db, "azure_blob", "acct", "raw/sales/orders.csv").await;
    assert_eq!(after.id, before.id);
    assert_eq!(after.file_hash, before.file_hash);
    assert_eq!(after.schema_hash, before.schema_hash);
    assert!(after.last_checked_at >= before.last_checked_at);

    let listing = db.list_visible(&RecordFilter::default(), 0, 20).await.unwrap();
    assert_eq!(listing.pagination.total, 2);
}

#[tokio::test]
async fn file_locator_scans_exactly_that_object() {
    let backend = Arc::new(MemoryBackend::new());
    backend.put("raw", "sales/orders.csv", b"order_id,amount\n1,9.5\n".to_vec());
    backend.put("raw", "sales/orders.csv.bak", b"order_id,amount\n1,9.5\n".to_vec());
    backend.put("raw", "sales/returns.csv", b"order_id\n7\n".to_vec());
    let db = CatalogDb::open_in_memory().await.unwrap();
    let scanner = scanner(&db, "acct", backend, true);

    let mut acct = account("acct", StorageKind::Blob, &[]);
    acct.locators = vec!["https://acct.blob.core.windows.net/raw/sales/orders.csv".to_string()];
    let report = scanner.scan(&[acct], &ScanCancelToken::new()).await;

    assert_eq!(report.stats.targets_scanned, 1);
    assert_eq!(report.stats.objects_seen, 1);
    assert_eq!(report.stats.inserted, 1);
    let orders = record(&db, "azure_blob", "acct", "raw/sales/orders.csv").await;
    assert_eq!(orders.folder_path, "sales");
    assert_eq!(orders.storage_metadata.folder_prefix, "sales");
    let listing = db.list_visible(&RecordFilter::default(), 0, 20).await.unwrap();
    assert_eq!(listing.pagination.total, 1);
}

#[tokio::test]
async fn modification_time_change_updates_content_but_not_approval() {
    let backend = Arc::new(MemoryBackend::new());
    backend.put("raw", "people.csv", b"id,name_first,email\n1,Ann,ann@example.com\n".to_vec());
    let db = CatalogDb::open_in_memory().await.unwrap();
    let scanner = scanner(&db, "acct", backend.clone(), true);
    let accounts = [account("acct", StorageKind::Blob, &["raw"])];

    scanner.scan(&accounts, &ScanCancelToken::new()).await;
    let original = record(&db, "azure_blob", "acct", "raw/people.csv").await;
    assert_eq!(original.status, RecordStatus::Pending);
    assert_eq!(original.approval_status, ApprovalStatus::PendingReview);
    db.approve(original.id, "gov", Some("data_governor"), None).await.unwrap();

    let later = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    assert!(backend.touch("raw", "people.csv", later));
    let report = scanner.scan(&accounts, &ScanCancelToken::new()).await;
    assert_eq!(report.stats.updated, 1);

    let updated = record(&db, "azure_blob", "acct", "raw/people.csv").await;
    assert_eq!(updated.id, original.id);
    assert_ne!(updated.file_hash, original.file_hash);
    assert_eq!(updated.schema_hash, original.schema_hash);
    assert_eq!(updated.file_metadata.last_modified, Some(later));
    assert_eq!(updated.status, RecordStatus::Approved);
    assert_eq!(updated.approval_status, ApprovalStatus::Approved);
    assert!(updated.is_visible);
    assert_eq!(updated.approval_workflow.history.len(), 1);
}

#[tokio::test]
async fn data_lake_scan_skips_directories_and_filters_extensions() {
    let backend = Arc::new(MemoryBackend::new());
    backend.put_directory("fs", "landing");
    backend.put_directory("fs", "landing/2024");
    backend.put_marker("fs", "landing/legacy");
    backend.put("fs", "landing/2024/events.JSON", br#"[{"ts": "2024-01-01", "ip_address": "10.1.2.3"}]"#.to_vec());
    backend.put("fs", "landing/readme.txt", b"hello".to_vec());
    let db = CatalogDb::open_in_memory().await.unwrap();
    let scanner = scanner(&db, "lake", backend, true);

    let mut lake = account("lake", StorageKind::DataLake, &["fs"]);
    lake.folders = vec!["landing".to_string()];
    lake.file_extensions = Some(vec!["json".to_string()]);
    let report = scanner.scan(&[lake], &ScanCancelToken::new()).await;

    assert_eq!(report.stats.objects_seen, 1);
    assert_eq!(report.stats.inserted, 1);
    let events = record(&db, "azure_datalake", "lake", "fs/landing/2024/events.JSON").await;
    assert_eq!(events.folder_path, "landing/2024");
    assert_eq!(events.storage_metadata.uri, "abfss://fs@lake.dfs.core.windows.net/landing/2024/events.JSON");
    assert_eq!(column_type(&events, "ts"), "string");
    let ip = events.schema.column("ip_address").unwrap();
    assert!(ip.pii_types.contains(&PiiType::Ip));
    assert_eq!(events.data_classification, DataClassification::Restricted);
}

#[tokio::test]
async fn csv_types_follow_the_eighty_percent_rule() {
    let backend = Arc::new(MemoryBackend::new());
    backend.put("raw", "mostly.csv", b"a,b\n1,1\n2,2\n3,3\nx,4\n,x\n".to_vec());
    let db = CatalogDb::open_in_memory().await.unwrap();
    let scanner = scanner(&db, "acct", backend, true);
    scanner
        .scan(&[account("acct", StorageKind::Blob, &["raw"])], &ScanCancelToken::new())
        .await;

    let mostly = record(&db, "azure_blob", "acct", "raw/mostly.csv").await;
    // a: 1,2,3,x  -> 75% integers
    // b: 1,2,3,4,x -> 80% integers
    assert_eq!(column_type(&mostly, "a"), "string");
    assert_eq!(column_type(&mostly, "b"), "int64");
    assert_eq!(mostly.schema.num_rows, None);
}

#[tokio::test]
async fn sampling_reads_only_the_head_window() {
    let mut body = String::from("id,comment\n");
    for i in 0..50_000 {
        body.push_str(&format!("{},row number {}\n", i, i));
    }
    assert!(body.len() > 500_000);

    let backend = Arc::new(MemoryBackend::new());
    backend.put("raw", "big.csv", body.into_bytes());
    let db = CatalogDb::open_in_memory().await.unwrap();
    let scanner = scanner(&db, "acct", backend.clone(), true);
    scanner
        .scan(&[account("acct", StorageKind::Blob, &["raw"])], &ScanCancelToken::new())
        .await;

    assert!(backend.bytes_read() <= 1024);
    let big = record(&db, "azure_blob", "acct", "raw/big.csv").await;
    assert_eq!(column_type(&big, "id"), "int64");
    assert_eq!(big.file_metadata.sample.bytes_read, 1024);
}

#[tokio::test]
async fn header_only_mode_still_flags_pii_by_name() {
    let backend = Arc::new(MemoryBackend::new());
    backend.put(
        "raw",
        "contacts.csv",
        b"user_email,x\nnot-an-address,4111-1111-1111-1111\n".to_vec(),
    );
    let db = CatalogDb::open_in_memory().await.unwrap();
    let accounts = [account("acct", StorageKind::Blob, &["raw"])];

    scanner(&db, "acct", backend.clone(), false)
        .scan(&accounts, &ScanCancelToken::new())
        .await;
    let names_only = record(&db, "azure_blob", "acct", "raw/contacts.csv").await;
    let email = names_only.schema.column("user_email").unwrap();
    assert!(email.pii_types.contains(&PiiType::Email));
    assert!(email.sample_values.is_empty());
    assert!(!names_only.schema.column("x").unwrap().pii_detected);

    let db = CatalogDb::open_in_memory().await.unwrap();
    scanner(&db, "acct", backend, true)
        .scan(&accounts, &ScanCancelToken::new())
        .await;
    let with_values = record(&db, "azure_blob", "acct", "raw/contacts.csv").await;
    let card = with_values.schema.column("x").unwrap();
    assert!(card.pii_types.contains(&PiiType::CreditCard));
    assert_eq!(with_values.data_classification, DataClassification::Confidential);
}

fn write_parquet(path: &std::path::Path, rows: i64) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("account_number", DataType::Utf8, false),
        Field::new("balance", DataType::Int64, true),
    ]));
    let accounts: ArrayRef = Arc::new(StringArray::from_iter_values((0..rows).map(|i| format!("ACC{:08}", i))));
    let balances: ArrayRef = Arc::new(Int64Array::from_iter_values(0..rows));
    let batch = RecordBatch::try_new(schema.clone(), vec![accounts, balances]).unwrap();

    let file = std::fs::File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

#[tokio::test]
async fn parquet_schema_comes_from_the_footer_on_disk() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("curated").join("finance");
    std::fs::create_dir_all(&dir).unwrap();
    write_parquet(&dir.join("balances.parquet"), 20_000);
    std::fs::write(dir.join("notes.csv"), "a\n").unwrap();

    let backend: Arc<dyn StorageBackend> = Arc::new(FsEmulatorBackend::new(tmp.path()).unwrap());
    let db = CatalogDb::open_in_memory().await.unwrap();
    let scanner = scanner(&db, "lake", backend, true);
    let mut lake = account("lake", StorageKind::DataLake, &["curated"]);
    lake.file_extensions = Some(vec!["parquet".to_string()]);
    let report = scanner.scan(&[lake], &ScanCancelToken::new()).await;
    assert_eq!(report.stats.inserted, 1);

    let balances = record(&db, "azure_datalake", "lake", "curated/finance/balances.parquet").await;
    assert_eq!(balances.schema.num_rows, Some(20_000));
    assert_eq!(column_type(&balances, "account_number"), "string");
    assert_eq!(column_type(&balances, "balance"), "int64");
    assert!(balances.schema.columns.iter().all(|c| c.sample_values.is_empty()));
    assert!(balances
        .schema
        .column("account_number")
        .unwrap()
        .pii_types
        .contains(&PiiType::BankAccount));
    assert_eq!(balances.data_classification, DataClassification::Confidential);
    assert!(balances.file_metadata.sample.degraded.is_none());
}

#[tokio::test]
async fn unreadable_object_is_recorded_with_unknown_schema() {
    let backend = Arc::new(MemoryBackend::new());
    backend.put("raw", "locked.csv", b"id\n1\n".to_vec());
    backend.fail_reads("locked.csv");
    let db = CatalogDb::open_in_memory().await.unwrap();
    let report = scanner(&db, "acct", backend, true)
        .scan(&[account("acct", StorageKind::Blob, &["raw"])], &ScanCancelToken::new())
        .await;

    assert_eq!(report.stats.inserted, 1);
    assert_eq!(report.stats.degraded, 1);
    let locked = record(&db, "azure_blob", "acct", "raw/locked.csv").await;
    assert!(locked.schema.columns.is_empty());
    assert!(locked.file_metadata.sample.degraded.is_some());
    assert_eq!(locked.data_classification, DataClassification::Internal);
}
