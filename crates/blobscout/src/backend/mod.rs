//! Storage backend capability.
//!
//! The engine only ever talks to storage through [`StorageBackend`]: one
//! page of a listing, a byte range, or an object's properties. Concrete
//! clients are handed out by a [`BackendFactory`] per account, so scans can
//! run against the local emulator or an in-memory fake without process-wide
//! state.

mod connection;
mod fs;
mod memory;

pub use connection::ConnectionString;
pub use fs::FsEmulatorBackend;
pub use memory::MemoryBackend;

use crate::config::{AccountConfig, AuthConfig};
use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Arc;

/// One listing request against a container/filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    /// Only entries whose path starts with this string.
    pub prefix: String,
    /// Descend into sub-directories (hierarchical namespaces only).
    pub recursive: bool,
}

/// Entry as reported by a backend listing, before any filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub path: String,
    pub is_directory: bool,
    pub size_bytes: u64,
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<RawEntry>,
    /// Token for the next page; `None` on the last page.
    pub continuation: Option<String>,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn list_page(
        &self,
        container: &str,
        request: &ListRequest,
        continuation: Option<String>,
    ) -> Result<ListPage>;

    /// Bytes in `range`, clamped to the object size.
    async fn read_range(&self, container: &str, path: &str, range: Range<u64>) -> Result<Bytes>;

    async fn properties(&self, container: &str, path: &str) -> Result<RawEntry>;

    async fn read_head(&self, container: &str, path: &str, len: u64) -> Result<Bytes> {
        self.read_range(container, path, 0..len).await
    }

    /// Last `len` bytes. Fetches properties when the size is not known.
    async fn read_tail(
        &self,
        container: &str,
        path: &str,
        len: u64,
        known_size: Option<u64>,
    ) -> Result<Bytes> {
        let size = match known_size {
            Some(size) => size,
            None => self.properties(container, path).await?.size_bytes,
        };
        self.read_range(container, path, size.saturating_sub(len)..size)
            .await
    }
}

/// Hands out a backend client for an account.
///
/// A failure here is an account-level authentication failure: the scanner
/// skips the account and carries on with the others.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn connect(&self, account: &AccountConfig) -> Result<Arc<dyn StorageBackend>>;
}

/// Factory for connection strings that point at a local emulator root
/// (`LocalRoot=/srv/storage`).
///
/// Remote accounts need a factory backed by a cloud client; this one
/// refuses them.
#[derive(Debug, Default, Clone)]
pub struct DefaultBackendFactory;

#[async_trait]
impl BackendFactory for DefaultBackendFactory {
    async fn connect(&self, account: &AccountConfig) -> Result<Arc<dyn StorageBackend>> {
        match &account.auth {
            AuthConfig::ConnectionString { connection_string } => {
                let parsed = ConnectionString::parse(connection_string)
                    .map_err(|e| ScoutError::authentication(&account.name, e.to_string()))?;
                match parsed.local_root() {
                    Some(root) => {
                        let backend = FsEmulatorBackend::new(root)
                            .map_err(|e| ScoutError::authentication(&account.name, e.to_string()))?;
                        Ok(Arc::new(backend))
                    }
                    None => Err(ScoutError::authentication(
                        &account.name,
                        format!(
                            "no client available for endpoint of account '{}'",
                            parsed.account_name().unwrap_or(&account.name)
                        ),
                    )),
                }
            }
            AuthConfig::ServicePrincipal { tenant_id, .. } => Err(ScoutError::authentication(
                &account.name,
                format!("service principal login (tenant {}) needs a remote backend factory", tenant_id),
            )),
        }
    }
}

/// Fixed account → backend mapping. Unknown accounts fail authentication.
#[derive(Default, Clone)]
pub struct StaticBackendFactory {
    backends: HashMap<String, Arc<dyn StorageBackend>>,
}

impl StaticBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, account: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        self.backends.insert(account.into(), backend);
        self
    }
}

#[async_trait]
impl BackendFactory for StaticBackendFactory {
    async fn connect(&self, account: &AccountConfig) -> Result<Arc<dyn StorageBackend>> {
        self.backends
            .get(&account.name)
            .cloned()
            .ok_or_else(|| ScoutError::authentication(&account.name, "no backend registered"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobscout_protocol::StorageKind;
    use tempfile::TempDir;

    fn account(auth: AuthConfig) -> AccountConfig {
        AccountConfig {
            name: "acct".to_string(),
            kind: StorageKind::Blob,
            auth,
            containers: vec![],
            folders: vec![],
            file_extensions: None,
            environment: "prod".to_string(),
            env_type: "production".to_string(),
            data_source_type: "unknown".to_string(),
            locators: vec![],
        }
    }

    #[tokio::test]
    async fn default_factory_connects_local_root() {
        let tmp = TempDir::new().unwrap();
        let auth = AuthConfig::ConnectionString {
            connection_string: format!("AccountName=acct;LocalRoot={}", tmp.path().display()),
        };
        let backend = DefaultBackendFactory.connect(&account(auth)).await.unwrap();
        assert_eq!(backend.name(), "fs-emulator");
    }

    #[tokio::test]
    async fn default_factory_refuses_remote_accounts() {
        let auth = AuthConfig::ConnectionString {
            connection_string: "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=abc==".to_string(),
        };
        let err = DefaultBackendFactory.connect(&account(auth)).await.err().unwrap();
        assert!(matches!(err, ScoutError::Authentication { .. }));

        let auth = AuthConfig::ServicePrincipal {
            client_id: "c".to_string(),
            client_secret: "s".to_string(),
            tenant_id: "t".to_string(),
        };
        let err = DefaultBackendFactory.connect(&account(auth)).await.err().unwrap();
        assert!(matches!(err, ScoutError::Authentication { .. }));
    }

    #[tokio::test]
    async fn tail_read_uses_properties_when_size_unknown() {
        let backend = MemoryBackend::new();
        backend.put("c", "f.bin", b"0123456789".to_vec());

        let tail = backend.read_tail("c", "f.bin", 4, None).await.unwrap();
        assert_eq!(&tail[..], b"6789");
        let head = backend.read_head("c", "f.bin", 100).await.unwrap();
        assert_eq!(head.len(), 10);
    }
}
