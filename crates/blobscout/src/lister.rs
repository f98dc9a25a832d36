//! Object listing.
//!
//! A lister turns a [`StorageTarget`] into a lazy, finite stream of objects.
//! Nothing is cached between calls: listing the same target twice walks the
//! backend twice. Directory entries and directory markers never reach the
//! caller, and the target's extension allow-list is applied here.

use crate::backend::{ListRequest, RawEntry, StorageBackend};
use crate::error::{Result, ScoutError};
use crate::types::StorageTarget;
use blobscout_protocol::{ObjectDescriptor, StorageKind};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Entries examined per data-lake listing call before it is cut short.
pub const DATA_LAKE_LISTING_CAP: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub enum ListingItem {
    Object(ObjectDescriptor),
    /// The listing stopped early; objects after this point were not seen.
    Partial(PartialListing),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialListing {
    pub target: String,
    pub limit: usize,
}

pub trait ObjectLister: Send + Sync {
    /// Items are yielded until the listing is exhausted, truncated (one
    /// `Partial` item) or fails (one `Err` item, then the stream ends).
    fn list_objects<'a>(&'a self, target: &'a StorageTarget) -> BoxStream<'a, Result<ListingItem>>;
}

/// Flat-namespace container listing with a prefix filter.
pub struct BlobLister {
    backend: Arc<dyn StorageBackend>,
    call_timeout: Duration,
}

impl BlobLister {
    pub fn new(backend: Arc<dyn StorageBackend>, call_timeout: Duration) -> Self {
        Self {
            backend,
            call_timeout,
        }
    }
}

impl ObjectLister for BlobLister {
    fn list_objects<'a>(&'a self, target: &'a StorageTarget) -> BoxStream<'a, Result<ListingItem>> {
        let request = ListRequest {
            prefix: target.list_prefix(),
            recursive: true,
        };
        listing_stream(self.backend.as_ref(), target, request, None, self.call_timeout)
    }
}

/// Hierarchical filesystem listing, recursive, capped per call.
pub struct DataLakeLister {
    backend: Arc<dyn StorageBackend>,
    call_timeout: Duration,
    cap: usize,
}

impl DataLakeLister {
    pub fn new(backend: Arc<dyn StorageBackend>, call_timeout: Duration) -> Self {
        Self {
            backend,
            call_timeout,
            cap: DATA_LAKE_LISTING_CAP,
        }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }
}

impl ObjectLister for DataLakeLister {
    fn list_objects<'a>(&'a self, target: &'a StorageTarget) -> BoxStream<'a, Result<ListingItem>> {
        let request = ListRequest {
            prefix: target.list_prefix(),
            recursive: true,
        };
        listing_stream(self.backend.as_ref(), target, request, Some(self.cap), self.call_timeout)
    }
}

/// Lister matching the target's backend kind.
pub fn lister_for(
    kind: StorageKind,
    backend: Arc<dyn StorageBackend>,
    call_timeout: Duration,
) -> Box<dyn ObjectLister> {
    match kind {
        StorageKind::Blob => Box::new(BlobLister::new(backend, call_timeout)),
        StorageKind::DataLake => Box::new(DataLakeLister::new(backend, call_timeout)),
    }
}

struct ListState<'a> {
    backend: &'a dyn StorageBackend,
    target: &'a StorageTarget,
    request: ListRequest,
    cap: Option<usize>,
    call_timeout: Duration,
    pending: VecDeque<RawEntry>,
    continuation: Option<String>,
    fetched_once: bool,
    examined: usize,
    finished: bool,
}

impl ListState<'_> {
    fn cap_reached(&self) -> bool {
        self.cap.map_or(false, |cap| self.examined >= cap)
    }

    fn partial(&mut self) -> ListingItem {
        self.finished = true;
        ListingItem::Partial(PartialListing {
            target: self.target.to_string(),
            limit: self.cap.unwrap_or(self.examined),
        })
    }

    async fn fetch(&mut self) -> Result<()> {
        let continuation = self.continuation.take();
        let page = timeout(
            self.call_timeout,
            self.backend
                .list_page(&self.target.container, &self.request, continuation),
        )
        .await
        .map_err(|_| ScoutError::timeout(format!("listing {}", self.target), self.call_timeout.as_secs()))?
        .map_err(|e| ScoutError::ListingFailure {
            target: self.target.to_string(),
            message: e.to_string(),
        })?;

        self.fetched_once = true;
        self.pending.extend(page.entries);
        self.continuation = page.continuation;
        Ok(())
    }
}

fn listing_stream<'a>(
    backend: &'a dyn StorageBackend,
    target: &'a StorageTarget,
    request: ListRequest,
    cap: Option<usize>,
    call_timeout: Duration,
) -> BoxStream<'a, Result<ListingItem>> {
    let state = ListState {
        backend,
        target,
        request,
        cap,
        call_timeout,
        pending: VecDeque::new(),
        continuation: None,
        fetched_once: false,
        examined: 0,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(entry) = state.pending.pop_front() {
                if state.cap_reached() {
                    let item = state.partial();
                    return Some((Ok(item), state));
                }
                state.examined += 1;
                if is_directory_entry(&entry) {
                    continue;
                }
                let object = descriptor_from_entry(entry);
                if !state.target.accepts_path(&object.full_path) || !state.target.accepts_name(&object.name) {
                    continue;
                }
                return Some((Ok(ListingItem::Object(object)), state));
            }

            if state.fetched_once && state.continuation.is_none() {
                return None;
            }
            if state.fetched_once && state.cap_reached() {
                let item = state.partial();
                return Some((Ok(item), state));
            }
            if let Err(e) = state.fetch().await {
                state.finished = true;
                return Some((Err(e), state));
            }
            debug!(target = %state.target, buffered = state.pending.len(), "Fetched listing page");
        }
    })
    .boxed()
}

/// Directory entries, `path/` placeholders and `hdi_isfolder` markers.
fn is_directory_entry(entry: &RawEntry) -> bool {
    entry.is_directory
        || entry.path.ends_with('/')
        || matches!(
            entry.metadata.get("hdi_isfolder"),
            Some(Value::String(flag)) if flag.eq_ignore_ascii_case("true")
        )
        || matches!(entry.metadata.get("hdi_isfolder"), Some(Value::Bool(true)))
}

/// Object view of a listing or properties entry.
pub fn descriptor_from_entry(entry: RawEntry) -> ObjectDescriptor {
    let full_path = entry.path.trim_start_matches('/').to_string();
    let name = full_path
        .rsplit('/')
        .next()
        .unwrap_or(full_path.as_str())
        .to_string();
    ObjectDescriptor {
        name,
        full_path,
        size_bytes: entry.size_bytes,
        etag: entry.etag,
        last_modified: entry.last_modified,
        created_at: entry.created_at,
        content_type: entry.content_type,
        backend_specific: entry.metadata.into_iter().collect(),
    }
}
