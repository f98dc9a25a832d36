//! In-memory backend for tests and dry runs.

use super::{ListPage, ListRequest, RawEntry, StorageBackend};
use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct MemoryEntry {
    data: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
    content_type: Option<String>,
    is_directory: bool,
    metadata: BTreeMap<String, Value>,
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<(String, String), MemoryEntry>,
    failing_containers: HashSet<String>,
    failing_paths: HashSet<String>,
    version: u64,
}

/// Objects keyed by `(container, path)`.
///
/// Every write bumps a version that feeds both the etag and the
/// modification time, so rewriting an object always changes its
/// fingerprint. Bytes served by reads are counted.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    page_size: usize,
    bytes_read: AtomicU64,
    list_calls: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: DEFAULT_PAGE_SIZE,
            bytes_read: AtomicU64::new(0),
            list_calls: AtomicU64::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn base_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0)
            .single()
            .unwrap_or_default()
    }

    /// Create or overwrite an object.
    pub fn put(&self, container: &str, path: &str, data: impl Into<Bytes>) {
        self.insert(container, path, data.into(), false, BTreeMap::new());
    }

    /// Flat-namespace folder placeholder (`path/` blob flagged `hdi_isfolder`).
    pub fn put_marker(&self, container: &str, path: &str) {
        let mut metadata = BTreeMap::new();
        metadata.insert("hdi_isfolder".to_string(), Value::from("true"));
        let path = format!("{}/", path.trim_end_matches('/'));
        self.insert(container, &path, Bytes::new(), false, metadata);
    }

    /// Hierarchical-namespace directory entry.
    pub fn put_directory(&self, container: &str, path: &str) {
        self.insert(container, path.trim_end_matches('/'), Bytes::new(), true, BTreeMap::new());
    }

    fn insert(
        &self,
        container: &str,
        path: &str,
        data: Bytes,
        is_directory: bool,
        metadata: BTreeMap<String, Value>,
    ) {
        let mut state = self.state();
        state.version += 1;
        let version = state.version;
        let content_type = if is_directory { None } else { guess_content_type(path) };
        state.objects.insert(
            (container.to_string(), path.to_string()),
            MemoryEntry {
                data,
                etag: format!("\"0x{:X}\"", version),
                last_modified: Self::base_time() + Duration::seconds(version as i64),
                content_type,
                is_directory,
                metadata,
            },
        );
    }

    /// Change only the modification time of an existing object.
    pub fn touch(&self, container: &str, path: &str, last_modified: DateTime<Utc>) -> bool {
        let mut state = self.state();
        match state.objects.get_mut(&(container.to_string(), path.to_string())) {
            Some(entry) => {
                entry.last_modified = last_modified;
                true
            }
            None => false,
        }
    }

    /// Make listings of `container` fail.
    pub fn fail_listing(&self, container: &str) {
        self.state().failing_containers.insert(container.to_string());
    }

    /// Make reads and property fetches of `path` fail.
    pub fn fail_reads(&self, path: &str) {
        self.state().failing_paths.insert(path.to_string());
    }

    /// Total bytes returned by `read_range`.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::Relaxed)
    }

    fn to_raw(path: &str, entry: &MemoryEntry) -> RawEntry {
        RawEntry {
            path: path.to_string(),
            is_directory: entry.is_directory,
            size_bytes: entry.data.len() as u64,
            etag: entry.etag.clone(),
            last_modified: Some(entry.last_modified),
            created_at: Some(Self::base_time()),
            content_type: entry.content_type.clone(),
            metadata: entry.metadata.clone(),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_page(
        &self,
        container: &str,
        request: &ListRequest,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.state();
        if state.failing_containers.contains(container) {
            return Err(ScoutError::backend(format!("permission denied on container '{}'", container)));
        }

        let mut entries = Vec::new();
        let mut last_key = None;
        let matching = state
            .objects
            .iter()
            .filter(|((c, _), _)| c == container)
            .filter(|((_, path), _)| path.starts_with(&request.prefix))
            .filter(|((_, path), _)| continuation.as_deref().map_or(true, |after| path.as_str() > after))
            .filter(|((_, path), _)| {
                request.recursive || !path[request.prefix.len()..].trim_end_matches('/').contains('/')
            });

        let mut has_more = false;
        for ((_, path), entry) in matching {
            if entries.len() == self.page_size {
                has_more = true;
                break;
            }
            entries.push(Self::to_raw(path, entry));
            last_key = Some(path.clone());
        }

        Ok(ListPage {
            entries,
            continuation: if has_more { last_key } else { None },
        })
    }

    async fn read_range(&self, container: &str, path: &str, range: Range<u64>) -> Result<Bytes> {
        let data = {
            let state = self.state();
            if state.failing_paths.contains(path) {
                return Err(ScoutError::backend(format!("read of '{}' refused", path)));
            }
            state
                .objects
                .get(&(container.to_string(), path.to_string()))
                .map(|entry| entry.data.clone())
                .ok_or_else(|| ScoutError::NotFound(format!("{}/{}", container, path)))?
        };

        let len = data.len() as u64;
        let start = range.start.min(len) as usize;
        let end = range.end.min(len).max(range.start.min(len)) as usize;
        let slice = data.slice(start..end);
        self.bytes_read.fetch_add(slice.len() as u64, Ordering::Relaxed);
        Ok(slice)
    }

    async fn properties(&self, container: &str, path: &str) -> Result<RawEntry> {
        let state = self.state();
        if state.failing_paths.contains(path) {
            return Err(ScoutError::backend(format!("properties of '{}' refused", path)));
        }
        state
            .objects
            .get(&(container.to_string(), path.to_string()))
            .map(|entry| Self::to_raw(path, entry))
            .ok_or_else(|| ScoutError::NotFound(format!("{}/{}", container, path)))
    }
}

pub(crate) fn guess_content_type(path: &str) -> Option<String> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "csv" => "text/csv",
        "json" => "application/json",
        "jsonl" | "ndjson" => "application/x-ndjson",
        "parquet" => "application/vnd.apache.parquet",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    };
    Some(mime.to_string())
}
