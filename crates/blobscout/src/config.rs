//! Configuration for discovery scans

use crate::error::{Result, ScoutError};
use crate::locator;
use crate::types::{normalize_folder, StorageTarget, TargetLabels};
use blobscout_protocol::StorageKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Environment variable that overrides `database_path`.
pub const DATABASE_ENV: &str = "BLOBSCOUT_DB";

/// Main configuration for a discovery scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Path to the SQLite catalog
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Objects processed concurrently per target
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Accounts, and targets within an account, scanned concurrently
    #[serde(default = "default_max_concurrent_targets")]
    pub max_concurrent_targets: usize,

    /// Upper bound for any single backend call
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_secs: u64,

    /// Refresh `last_checked_at` on unchanged records
    #[serde(default = "default_true")]
    pub touch_on_unchanged: bool,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

fn default_database_path() -> PathBuf {
    blobscout_logging::blobscout_home().join("catalog.sqlite3")
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

fn default_max_concurrent_targets() -> usize {
    4
}

fn default_backend_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            workers: default_workers(),
            max_concurrent_targets: default_max_concurrent_targets(),
            backend_timeout_secs: default_backend_timeout(),
            touch_on_unchanged: true,
            sampling: SamplingConfig::default(),
            accounts: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        if let Ok(db) = std::env::var(DATABASE_ENV) {
            if !db.trim().is_empty() {
                config.database_path = PathBuf::from(db);
            }
        }
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DiscoveryConfig =
            toml::from_str(content).map_err(|e| ScoutError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if account.name.trim().is_empty() {
                return Err(ScoutError::Config("account name must not be empty".to_string()));
            }
            if !seen.insert(account.name.as_str()) {
                return Err(ScoutError::Config(format!(
                    "account '{}' is configured twice",
                    account.name
                )));
            }
        }
        Ok(())
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs.max(1))
    }
}

/// Sample window sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Head window for non-Parquet objects; defaults per backend and is
    /// clamped to 1024..=2048
    #[serde(default)]
    pub head_bytes: Option<u64>,

    /// Tail window for Parquet objects
    #[serde(default = "default_tail_bytes")]
    pub tail_bytes: u64,

    /// Keep column values for classification and sample display. When off,
    /// only header/key names are inspected.
    #[serde(default = "default_true")]
    pub capture_sample_values: bool,
}

fn default_tail_bytes() -> u64 {
    8192
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            head_bytes: None,
            tail_bytes: default_tail_bytes(),
            capture_sample_values: true,
        }
    }
}

/// How to authenticate against an account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthConfig {
    ConnectionString {
        connection_string: String,
    },
    ServicePrincipal {
        client_id: String,
        client_secret: String,
        tenant_id: String,
    },
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::ConnectionString { .. } => f
                .debug_struct("ConnectionString")
                .field("connection_string", &"[REDACTED]")
                .finish(),
            AuthConfig::ServicePrincipal {
                client_id,
                tenant_id,
                ..
            } => f
                .debug_struct("ServicePrincipal")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("tenant_id", tenant_id)
                .finish(),
        }
    }
}

/// One storage account and what to scan in it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,

    pub kind: StorageKind,

    pub auth: AuthConfig,

    #[serde(default)]
    pub containers: Vec<String>,

    /// Folders scanned in every container; empty means the container root
    #[serde(default)]
    pub folders: Vec<String>,

    #[serde(default)]
    pub file_extensions: Option<Vec<String>>,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_env_type")]
    pub env_type: String,

    #[serde(default = "default_data_source_type")]
    pub data_source_type: String,

    /// Extra scan roots given as storage locators
    #[serde(default)]
    pub locators: Vec<String>,
}

fn default_environment() -> String {
    "prod".to_string()
}

fn default_env_type() -> String {
    "production".to_string()
}

fn default_data_source_type() -> String {
    "unknown".to_string()
}

impl AccountConfig {
    pub fn labels(&self) -> TargetLabels {
        TargetLabels {
            environment: self.environment.clone(),
            env_type: self.env_type.clone(),
            data_source_type: self.data_source_type.clone(),
        }
    }

    /// Expand containers × folders, then locators, into scan targets.
    ///
    /// Locators that do not resolve, point at an unsupported backend, or name
    /// a different account are logged and skipped.
    pub fn targets(&self) -> Vec<StorageTarget> {
        let folders: Vec<String> = if self.folders.is_empty() {
            vec![String::new()]
        } else {
            self.folders.iter().map(|f| normalize_folder(f)).collect()
        };

        let mut targets = Vec::new();
        for container in &self.containers {
            for folder in &folders {
                targets.push(self.target(self.kind, container, folder));
            }
        }

        for raw in &self.locators {
            match locator::resolve(raw).and_then(|loc| loc.scan_coordinates(&self.name)) {
                Ok(coords) if coords.account == self.name => {
                    let target = self.target(coords.kind, &coords.container, &coords.folder);
                    targets.push(match coords.object {
                        Some(object) => target.with_object(object),
                        None => target,
                    });
                }
                Ok(coords) => {
                    warn!(
                        account = %self.name,
                        locator = %raw,
                        other = %coords.account,
                        "Locator names a different account, skipping"
                    );
                }
                Err(e) => {
                    warn!(account = %self.name, locator = %raw, error = %e, "Skipping locator");
                }
            }
        }

        let mut seen = BTreeSet::new();
        targets.retain(|t| {
            seen.insert((
                t.backend,
                t.container.clone(),
                t.folder_prefix.clone(),
                t.object_path.clone(),
            ))
        });
        targets
    }

    fn target(&self, kind: StorageKind, container: &str, folder: &str) -> StorageTarget {
        let mut target = StorageTarget::new(kind, &self.name, container, folder)
            .with_labels(self.labels());
        if let Some(exts) = &self.file_extensions {
            target = target.with_extensions(exts);
        }
        target
    }
}
