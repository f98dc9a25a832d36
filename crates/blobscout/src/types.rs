//! Scan units.

use blobscout_protocol::StorageKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Catalog labels copied onto every record found under a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLabels {
    pub environment: String,
    pub env_type: String,
    pub data_source_type: String,
}

impl Default for TargetLabels {
    fn default() -> Self {
        Self {
            environment: "prod".to_string(),
            env_type: "production".to_string(),
            data_source_type: "unknown".to_string(),
        }
    }
}

/// One scan unit: a folder inside a container of an account.
///
/// Built from configuration at scan start and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageTarget {
    pub backend: StorageKind,
    pub account_name: String,
    pub container: String,
    /// Folder inside the container, without leading or trailing slashes.
    pub folder_prefix: String,
    /// Set when the target names a single object; only that path is listed.
    #[serde(default)]
    pub object_path: Option<String>,
    /// Lowercased extensions without the dot. `None` accepts everything.
    pub allowed_extensions: Option<BTreeSet<String>>,
    pub labels: TargetLabels,
}

impl StorageTarget {
    pub fn new(
        backend: StorageKind,
        account_name: impl Into<String>,
        container: impl Into<String>,
        folder_prefix: impl AsRef<str>,
    ) -> Self {
        Self {
            backend,
            account_name: account_name.into(),
            container: container.into(),
            folder_prefix: normalize_folder(folder_prefix.as_ref()),
            object_path: None,
            allowed_extensions: None,
            labels: TargetLabels::default(),
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self.allowed_extensions = if set.is_empty() { None } else { Some(set) };
        self
    }

    /// Narrow the target to the object at `path`. The folder becomes the
    /// object's parent.
    pub fn with_object(mut self, path: impl AsRef<str>) -> Self {
        let path = normalize_folder(path.as_ref());
        self.folder_prefix = path
            .rsplit_once('/')
            .map(|(folder, _)| folder.to_string())
            .unwrap_or_default();
        self.object_path = Some(path);
        self
    }

    pub fn with_labels(mut self, labels: TargetLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Listing prefix: the object path, else the folder followed by `/`, or
    /// empty for the root.
    pub fn list_prefix(&self) -> String {
        if let Some(path) = &self.object_path {
            path.clone()
        } else if self.folder_prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.folder_prefix)
        }
    }

    /// Single-object targets accept only their own path.
    pub fn accepts_path(&self, full_path: &str) -> bool {
        self.object_path.as_deref().map_or(true, |path| path == full_path)
    }

    /// Case-insensitive suffix match against the allow-list.
    pub fn accepts_name(&self, name: &str) -> bool {
        match &self.allowed_extensions {
            None => true,
            Some(exts) => {
                let lower = name.to_ascii_lowercase();
                exts.iter().any(|ext| lower.ends_with(&format!(".{}", ext)))
            }
        }
    }
}

impl fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.backend, self.account_name, self.container)?;
        match &self.object_path {
            Some(path) => write!(f, "/{}", path)?,
            None if !self.folder_prefix.is_empty() => write!(f, "/{}", self.folder_prefix)?,
            None => {}
        }
        Ok(())
    }
}

pub(crate) fn normalize_folder(folder: &str) -> String {
    folder.trim().trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_prefix_is_normalized() {
        let target = StorageTarget::new(StorageKind::Blob, "acct", "raw", "/landing/2024/");
        assert_eq!(target.folder_prefix, "landing/2024");
        assert_eq!(target.list_prefix(), "landing/2024/");
        assert_eq!(target.to_string(), "blob:acct/raw/landing/2024");

        let root = StorageTarget::new(StorageKind::Blob, "acct", "raw", "");
        assert_eq!(root.list_prefix(), "");
    }

    #[test]
    fn object_target_lists_only_its_path() {
        let target = StorageTarget::new(StorageKind::Blob, "acct", "raw", "").with_object("/sales/orders.csv");
        assert_eq!(target.folder_prefix, "sales");
        assert_eq!(target.list_prefix(), "sales/orders.csv");
        assert_eq!(target.to_string(), "blob:acct/raw/sales/orders.csv");
        assert!(target.accepts_path("sales/orders.csv"));
        assert!(!target.accepts_path("sales/orders.csv.bak"));

        let top = StorageTarget::new(StorageKind::Blob, "acct", "raw", "").with_object("orders.csv");
        assert_eq!(top.folder_prefix, "");
        assert_eq!(top.list_prefix(), "orders.csv");
    }

    #[test]
    fn extension_allow_list_is_case_insensitive() {
        let target = StorageTarget::new(StorageKind::DataLake, "acct", "fs", "")
            .with_extensions([".CSV", "parquet", " "]);

        assert!(target.accepts_name("orders.csv"));
        assert!(target.accepts_name("EVENTS.Parquet"));
        assert!(!target.accepts_name("notes.txt"));
        assert!(!target.accepts_name("csv"));

        let open = StorageTarget::new(StorageKind::Blob, "acct", "raw", "").with_extensions(Vec::<String>::new());
        assert!(open.allowed_extensions.is_none());
        assert!(open.accepts_name("anything.bin"));
    }
}
