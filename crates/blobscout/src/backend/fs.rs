//! Local storage emulator.
//!
//! Serves a directory tree as storage: each top-level directory under the
//! root is a container, files are objects and sub-directories are reported
//! as directory entries (the hierarchical view). Blob listings simply skip
//! those entries.

use super::memory::guess_content_type;
use super::{ListPage, ListRequest, RawEntry, StorageBackend};
use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs::Metadata;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use walkdir::WalkDir;

const DEFAULT_PAGE_SIZE: usize = 5000;

#[derive(Debug, Clone)]
pub struct FsEmulatorBackend {
    root: PathBuf,
    page_size: usize,
}

impl FsEmulatorBackend {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ScoutError::NotFound(format!(
                "emulator root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self {
            root,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `container/path` below the root, refusing escapes.
    fn resolve(&self, container: &str, path: &str) -> Result<PathBuf> {
        let mut resolved = self.root.clone();
        for part in [container, path] {
            for component in Path::new(part).components() {
                match component {
                    Component::Normal(segment) => resolved.push(segment),
                    Component::CurDir => {}
                    _ => {
                        return Err(ScoutError::backend(format!(
                            "path '{}' escapes the emulator root",
                            part
                        )))
                    }
                }
            }
        }
        Ok(resolved)
    }

    /// One page of entries in walk order, resuming after the path named by
    /// `after`. Subtrees that sort entirely before `after` are pruned, so a
    /// page never rewalks what earlier pages returned.
    fn list_sync(&self, container: &str, request: &ListRequest, after: Option<&Path>) -> Result<ListPage> {
        let base = self.resolve(container, "")?;
        if !base.is_dir() {
            return Err(ScoutError::NotFound(format!("container '{}'", container)));
        }

        // Walk only below the deepest directory named by the prefix.
        let prefix_dir = match request.prefix.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => "",
        };
        let start = self.resolve(container, prefix_dir)?;
        if !start.is_dir() {
            return Ok(ListPage::default());
        }

        let mut walker = WalkDir::new(&start).min_depth(1).sort_by_file_name();
        if !request.recursive {
            walker = walker.max_depth(1);
        }
        // Sorted pre-order visits paths in `Path` order.
        let walk = walker.into_iter().filter_entry(|item| {
            let relative = item.path().strip_prefix(&base).unwrap_or(item.path());
            after.map_or(true, |after| after.starts_with(relative) || relative > after)
        });

        let mut entries = Vec::new();
        let mut has_more = false;
        for item in walk {
            let item = item?;
            if after.map_or(false, |after| item.path().strip_prefix(&base).unwrap_or(item.path()) <= after) {
                continue;
            }
            let relative = relative_path(&base, item.path());
            if !relative.starts_with(&request.prefix) {
                continue;
            }
            if !request.recursive && relative[request.prefix.len()..].contains('/') {
                continue;
            }
            if entries.len() == self.page_size {
                has_more = true;
                break;
            }
            let metadata = item.metadata()?;
            entries.push(raw_entry(relative, &metadata));
        }

        let continuation = if has_more {
            entries.last().map(|entry: &RawEntry| entry.path.clone())
        } else {
            None
        };
        Ok(ListPage {
            continuation,
            entries,
        })
    }
}

#[async_trait]
impl StorageBackend for FsEmulatorBackend {
    fn name(&self) -> &str {
        "fs-emulator"
    }

    async fn list_page(
        &self,
        container: &str,
        request: &ListRequest,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        if let Some(token) = &continuation {
            if token.is_empty() || Path::new(token).components().any(|c| !matches!(c, Component::Normal(_))) {
                return Err(ScoutError::backend(format!("invalid continuation token '{}'", token)));
            }
        }
        let backend = self.clone();
        let container = container.to_string();
        let request = request.clone();
        tokio::task::spawn_blocking(move || {
            backend.list_sync(&container, &request, continuation.as_deref().map(Path::new))
        })
            .await
            .map_err(|e| ScoutError::backend(format!("listing task failed: {}", e)))?
    }

    async fn read_range(&self, container: &str, path: &str, range: Range<u64>) -> Result<Bytes> {
        let full = self.resolve(container, path)?;
        let mut file = tokio::fs::File::open(&full).await?;
        let size = file.metadata().await?.len();
        let start = range.start.min(size);
        let end = range.end.min(size).max(start);

        file.seek(std::io::SeekFrom::Start(start)).await?;
        let mut buf = Vec::with_capacity((end - start) as usize);
        file.take(end - start).read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn properties(&self, container: &str, path: &str) -> Result<RawEntry> {
        let full = self.resolve(container, path)?;
        let metadata = tokio::fs::metadata(&full).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ScoutError::NotFound(format!("{}/{}", container, path))
            } else {
                ScoutError::Io(e)
            }
        })?;
        Ok(raw_entry(path.trim_matches('/').to_string(), &metadata))
    }
}

fn relative_path(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn raw_entry(path: String, metadata: &Metadata) -> RawEntry {
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    let created = metadata.created().ok().map(DateTime::<Utc>::from);
    let nanos = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let is_directory = metadata.is_dir();
    let size_bytes = if is_directory { 0 } else { metadata.len() };

    RawEntry {
        content_type: if is_directory { None } else { guess_content_type(&path) },
        path,
        is_directory,
        size_bytes,
        etag: format!("\"{:x}-{:x}\"", nanos, size_bytes),
        last_modified: modified,
        created_at: created,
        metadata: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("landing");
        fs::create_dir_all(base.join("sales/2024")).unwrap();
        fs::write(base.join("sales/orders.csv"), "id,email\n1,a@b.io\n").unwrap();
        fs::write(base.join("sales/2024/jan.json"), r#"{"id": 1}"#).unwrap();
        fs::write(base.join("readme.txt"), "hello").unwrap();
        tmp
    }

    fn request(prefix: &str, recursive: bool) -> ListRequest {
        ListRequest {
            prefix: prefix.to_string(),
            recursive,
        }
    }

    #[tokio::test]
    async fn lists_recursively_with_directories() {
        let tmp = tree();
        let backend = FsEmulatorBackend::new(tmp.path()).unwrap();

        let page = backend.list_page("landing", &request("sales/", true), None).await.unwrap();
        let listed: Vec<(&str, bool)> = page
            .entries
            .iter()
            .map(|e| (e.path.as_str(), e.is_directory))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("sales/2024", true),
                ("sales/2024/jan.json", false),
                ("sales/orders.csv", false),
            ]
        );
        assert!(page.continuation.is_none());
    }

    #[tokio::test]
    async fn non_recursive_and_paging() {
        let tmp = tree();
        let backend = FsEmulatorBackend::new(tmp.path()).unwrap().with_page_size(1);

        let first = backend.list_page("landing", &request("", false), None).await.unwrap();
        assert_eq!(first.entries.len(), 1);
        let token = first.continuation.clone().unwrap();
        let second = backend.list_page("landing", &request("", false), Some(token)).await.unwrap();
        assert_eq!(second.entries[0].path, "sales");
        assert!(second.continuation.is_none());
        assert_eq!(first.entries[0].path, "readme.txt");
    }

    #[tokio::test]
    async fn paged_walk_resumes_after_the_last_path() {
        let tmp = tree();
        let base = tmp.path().join("landing");
        fs::create_dir_all(base.join("sales-archive")).unwrap();
        fs::write(base.join("sales-archive/old.csv"), "a\n").unwrap();
        let full = FsEmulatorBackend::new(tmp.path()).unwrap();
        let paged = full.clone().with_page_size(2);

        let expected: Vec<String> = full
            .list_page("landing", &request("", true), None)
            .await
            .unwrap()
            .entries
            .into_iter()
            .map(|e| e.path)
            .collect();

        let mut walked = Vec::new();
        let mut token = None;
        loop {
            let page = paged.list_page("landing", &request("", true), token).await.unwrap();
            walked.extend(page.entries.into_iter().map(|e| e.path));
            token = page.continuation;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(walked, expected);
        assert_eq!(expected.len(), 7);

        let bad = paged
            .list_page("landing", &request("", true), Some("../x".to_string()))
            .await;
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn reads_ranges_and_properties() {
        let tmp = tree();
        let backend = FsEmulatorBackend::new(tmp.path()).unwrap();

        let head = backend.read_head("landing", "readme.txt", 3).await.unwrap();
        assert_eq!(&head[..], b"hel");
        let tail = backend.read_tail("landing", "readme.txt", 100, None).await.unwrap();
        assert_eq!(&tail[..], b"hello");

        let props = backend.properties("landing", "sales/orders.csv").await.unwrap();
        assert_eq!(props.size_bytes, 18);
        assert_eq!(props.content_type.as_deref(), Some("text/csv"));
        assert!(props.last_modified.is_some());

        assert!(matches!(
            backend.properties("landing", "nope.csv").await,
            Err(ScoutError::NotFound(_))
        ));
        assert!(backend.read_head("landing", "../escape", 1).await.is_err());
    }

    #[tokio::test]
    async fn missing_container_is_an_error() {
        let tmp = tree();
        let backend = FsEmulatorBackend::new(tmp.path()).unwrap();
        assert!(backend.list_page("nope", &request("", true), None).await.is_err());
        assert!(FsEmulatorBackend::new(tmp.path().join("missing")).is_err());
    }
}
