//! Insert / update / skip decisions against the catalog.
//!
//! The decision itself is a pure function of the prior record's hashes and
//! the freshly computed ones ([`decide`]). [`DedupEngine`] applies it against
//! a [`CatalogStore`], holding a per-key lock so that one process never has
//! two transactions in flight for the same record. Conflicts with other
//! processes surface as a duplicate-key insert, which is retried as an
//! update against the winner's row.

use crate::error::Result;
use blobscout_catalog::{CatalogError, CatalogRecord, CatalogStore, ContentUpdate, RecordDraft, RecordKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Hashes of the record already in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorState {
    pub id: i64,
    pub file_hash: String,
    pub schema_hash: String,
}

impl From<&CatalogRecord> for PriorState {
    fn from(record: &CatalogRecord) -> Self {
        Self {
            id: record.id,
            file_hash: record.file_hash.clone(),
            schema_hash: record.schema_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertDecision {
    Insert,
    /// Both hashes match; nothing is written.
    NoOp,
    /// Both hashes match; only `last_checked_at` is refreshed.
    TouchOnly,
    /// Content fields are rewritten; workflow fields are left alone.
    UpdateContent { file_changed: bool, schema_changed: bool },
}

/// Decision for a key that already has a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    NoOp,
    TouchOnly,
    UpdateContent { file_changed: bool, schema_changed: bool },
}

impl From<Revision> for UpsertDecision {
    fn from(revision: Revision) -> Self {
        match revision {
            Revision::NoOp => UpsertDecision::NoOp,
            Revision::TouchOnly => UpsertDecision::TouchOnly,
            Revision::UpdateContent {
                file_changed,
                schema_changed,
            } => UpsertDecision::UpdateContent {
                file_changed,
                schema_changed,
            },
        }
    }
}

pub fn decide(prior: Option<&PriorState>, file_hash: &str, schema_hash: &str, touch_on_unchanged: bool) -> UpsertDecision {
    match prior {
        Some(prior) => revise(prior, file_hash, schema_hash, touch_on_unchanged).into(),
        None => UpsertDecision::Insert,
    }
}

pub fn revise(prior: &PriorState, file_hash: &str, schema_hash: &str, touch_on_unchanged: bool) -> Revision {
    let file_changed = prior.file_hash != file_hash;
    let schema_changed = prior.schema_hash != schema_hash;
    if file_changed || schema_changed {
        Revision::UpdateContent {
            file_changed,
            schema_changed,
        }
    } else if touch_on_unchanged {
        Revision::TouchOnly
    } else {
        Revision::NoOp
    }
}

/// What the engine did for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    Inserted { id: i64 },
    Unchanged { id: i64, touched: bool },
    Updated { id: i64, file_changed: bool, schema_changed: bool },
}

impl DedupOutcome {
    pub fn id(&self) -> i64 {
        match self {
            DedupOutcome::Inserted { id }
            | DedupOutcome::Unchanged { id, .. }
            | DedupOutcome::Updated { id, .. } => *id,
        }
    }
}

/// One async lock per key, dropped from the table once nobody holds or
/// waits for it.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<RecordKey, KeyLock>>,
}

struct KeyLock {
    mutex: Arc<AsyncMutex<()>>,
    /// Guards holding or waiting for `mutex`.
    holders: usize,
}

struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    key: RecordKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    fn table(&self) -> MutexGuard<'_, HashMap<RecordKey, KeyLock>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn acquire(&self, key: &RecordKey) -> KeyGuard<'_> {
        let mutex = {
            let mut table = self.table();
            let entry = table.entry(key.clone()).or_insert_with(|| KeyLock {
                mutex: Arc::default(),
                holders: 0,
            });
            entry.holders += 1;
            entry.mutex.clone()
        };
        // Registered before the wait so a cancelled wait still releases it.
        let mut held = KeyGuard {
            owner: self,
            key: key.clone(),
            guard: None,
        };
        held.guard = Some(mutex.lock_owned().await);
        held
    }

    fn len(&self) -> usize {
        self.table().len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.owner.table();
        drop(self.guard.take());
        if let Some(entry) = table.get_mut(&self.key) {
            entry.holders = entry.holders.saturating_sub(1);
            if entry.holders == 0 {
                table.remove(&self.key);
            }
        }
    }
}

pub struct DedupEngine {
    store: Arc<dyn CatalogStore>,
    locks: KeyLocks,
    touch_on_unchanged: bool,
}

impl DedupEngine {
    pub fn new(store: Arc<dyn CatalogStore>, touch_on_unchanged: bool) -> Self {
        Self {
            store,
            locks: KeyLocks::default(),
            touch_on_unchanged,
        }
    }

    /// Bring the catalog in line with `draft`. Each write is its own
    /// transaction; an error leaves the record as it was.
    pub async fn apply(&self, draft: &RecordDraft) -> Result<DedupOutcome> {
        let _guard = self.locks.acquire(&draft.key).await;

        match self.store.find_by_key(&draft.key).await? {
            Some(record) => self.apply_to_existing(&record, draft).await,
            None => match self.store.insert(draft).await {
                Ok(id) => {
                    debug!(key = %draft.key, id, "Inserted discovery record");
                    Ok(DedupOutcome::Inserted { id })
                }
                Err(CatalogError::DuplicateKey(_)) => {
                    debug!(key = %draft.key, "Insert lost a race, retrying as update");
                    let record = self
                        .store
                        .find_by_key(&draft.key)
                        .await?
                        .ok_or_else(|| CatalogError::not_found(draft.key.to_string()))?;
                    self.apply_to_existing(&record, draft).await
                }
                Err(e) => Err(e.into()),
            },
        }
    }

    async fn apply_to_existing(&self, record: &CatalogRecord, draft: &RecordDraft) -> Result<DedupOutcome> {
        let prior = PriorState::from(record);
        match revise(&prior, &draft.file_hash, &draft.schema_hash, self.touch_on_unchanged) {
            Revision::NoOp => Ok(DedupOutcome::Unchanged {
                id: prior.id,
                touched: false,
            }),
            Revision::TouchOnly => {
                self.store.touch_last_checked(prior.id).await?;
                Ok(DedupOutcome::Unchanged {
                    id: prior.id,
                    touched: true,
                })
            }
            Revision::UpdateContent {
                file_changed,
                schema_changed,
            } => {
                self.store
                    .update_content(prior.id, &ContentUpdate::from(draft))
                    .await?;
                debug!(key = %draft.key, id = prior.id, file_changed, schema_changed, "Updated discovery record");
                Ok(DedupOutcome::Updated {
                    id: prior.id,
                    file_changed,
                    schema_changed,
                })
            }
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blobscout_catalog::{CatalogDb, RecordStatus};
    use blobscout_protocol::{
        DataClassification, FileFormat, FileMetadata, PiiSummary, SampleSummary, SchemaDescriptor,
        StorageMetadata,
    };
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn prior(file: &str, schema: &str) -> PriorState {
        PriorState {
            id: 1,
            file_hash: file.to_string(),
            schema_hash: schema.to_string(),
        }
    }

    #[test]
    fn decision_table() {
        assert_eq!(decide(None, "A", "S", true), UpsertDecision::Insert);
        assert_eq!(decide(Some(&prior("A", "S")), "A", "S", false), UpsertDecision::NoOp);
        assert_eq!(decide(Some(&prior("A", "S")), "A", "S", true), UpsertDecision::TouchOnly);
        assert_eq!(
            decide(Some(&prior("A", "S")), "B", "S", true),
            UpsertDecision::UpdateContent {
                file_changed: true,
                schema_changed: false
            }
        );
        assert_eq!(
            decide(Some(&prior("A", "S")), "A", "T", false),
            UpsertDecision::UpdateContent {
                file_changed: false,
                schema_changed: true
            }
        );
    }

    #[test]
    fn existing_record_revision_never_inserts() {
        assert_eq!(revise(&prior("A", "S"), "A", "S", false), Revision::NoOp);
        assert_eq!(
            decide(Some(&prior("A", "S")), "B", "T", true),
            UpsertDecision::from(revise(&prior("A", "S"), "B", "T", true))
        );
    }

    #[tokio::test]
    async fn cancelled_lock_wait_is_evicted() {
        let locks = KeyLocks::default();
        let key = RecordKey::new("azure_blob", "acct", "raw/a.csv");
        let held = locks.acquire(&key).await;

        let waited = tokio::time::timeout(std::time::Duration::from_millis(20), locks.acquire(&key)).await;
        assert!(waited.is_err());
        assert_eq!(locks.len(), 1);

        drop(held);
        assert_eq!(locks.len(), 0);
        let again = locks.acquire(&key).await;
        assert_eq!(locks.len(), 1);
        drop(again);
        assert_eq!(locks.len(), 0);
    }

    fn draft(file_hash: &str) -> RecordDraft {
        let schema = SchemaDescriptor::empty();
        RecordDraft {
            key: RecordKey::new("azure_blob", "acct", "raw/a.csv"),
            file_name: "a.csv".to_string(),
            folder_path: String::new(),
            file_hash: file_hash.to_string(),
            schema_hash: "schema".to_string(),
            file_metadata: FileMetadata {
                file_name: "a.csv".to_string(),
                file_extension: "csv".to_string(),
                file_format: FileFormat::Csv,
                file_size: 1,
                content_type: None,
                etag: "e".to_string(),
                last_modified: None,
                created_at: None,
                num_columns: 0,
                num_rows: None,
                data_classification: DataClassification::Internal,
                pii_summary: PiiSummary::default(),
                sample: SampleSummary::default(),
            },
            schema,
            storage_metadata: StorageMetadata {
                storage_type: "azure_blob".to_string(),
                account_name: "acct".to_string(),
                container: "raw".to_string(),
                folder_prefix: String::new(),
                full_path: "a.csv".to_string(),
                uri: "https://acct.blob.core.windows.net/raw/a.csv".to_string(),
                backend_specific: BTreeMap::new(),
            },
            data_classification: DataClassification::Internal,
            environment: "prod".to_string(),
            env_type: "production".to_string(),
            data_source_type: "unknown".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_then_noop_then_update() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        let engine = DedupEngine::new(Arc::new(db.clone()), false);

        let first = engine.apply(&draft("A")).await.unwrap();
        assert!(matches!(first, DedupOutcome::Inserted { .. }));
        let second = engine.apply(&draft("A")).await.unwrap();
        assert_eq!(
            second,
            DedupOutcome::Unchanged {
                id: first.id(),
                touched: false
            }
        );
        let third = engine.apply(&draft("B")).await.unwrap();
        assert_eq!(
            third,
            DedupOutcome::Updated {
                id: first.id(),
                file_changed: true,
                schema_changed: false
            }
        );

        let record = db.find_by_key(&draft("B").key).await.unwrap().unwrap();
        assert_eq!(record.file_hash, "B");
        assert_eq!(record.status, RecordStatus::Pending);
        assert_eq!(engine.tracked_keys(), 0);
    }

    /// Hides the existing row from the first lookup, as if another
    /// process inserted it between our lookup and our insert.
    struct RacingStore {
        inner: CatalogDb,
        hidden_once: AtomicBool,
    }

    #[async_trait]
    impl CatalogStore for RacingStore {
        async fn find_by_key(&self, key: &RecordKey) -> blobscout_catalog::Result<Option<CatalogRecord>> {
            if !self.hidden_once.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_by_key(key).await
        }

        async fn insert(&self, draft: &RecordDraft) -> blobscout_catalog::Result<i64> {
            self.inner.insert(draft).await
        }

        async fn update_content(&self, id: i64, update: &ContentUpdate) -> blobscout_catalog::Result<()> {
            self.inner.update_content(id, update).await
        }

        async fn touch_last_checked(&self, id: i64) -> blobscout_catalog::Result<()> {
            self.inner.touch_last_checked(id).await
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_retried_as_update() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        let existing = db.insert(&draft("A")).await.unwrap();

        let store = RacingStore {
            inner: db.clone(),
            hidden_once: AtomicBool::new(false),
        };
        let engine = DedupEngine::new(Arc::new(store), true);
        let outcome = engine.apply(&draft("B")).await.unwrap();

        assert_eq!(
            outcome,
            DedupOutcome::Updated {
                id: existing,
                file_changed: true,
                schema_changed: false
            }
        );
    }

    #[tokio::test]
    async fn concurrent_applies_create_one_record() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        let engine = Arc::new(DedupEngine::new(Arc::new(db.clone()), true));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.apply(&draft("A")).await })
            })
            .collect();

        let mut inserted = 0;
        for task in tasks {
            if let DedupOutcome::Inserted { .. } = task.await.unwrap().unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(engine.tracked_keys(), 0);
    }
}
