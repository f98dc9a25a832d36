//! Storage locator resolution.
//!
//! A locator is any string that names a place in object storage:
//! `abfss://fs@acct.dfs.core.windows.net/dir`, `s3://bucket/key`,
//! `https://acct.blob.core.windows.net/container/path`, or the bare
//! `account/container/path` form.
//!
//! Formats are a closed set tried in a fixed order, most specific first. A
//! format that claims a locator but cannot parse it does not end resolution;
//! the next format gets a chance. The bare path form is last so that it
//! never shadows a scheme-qualified locator.

use crate::error::{Result, ScoutError};
use blobscout_protocol::StorageKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

static ABFS_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(abfss?)://([^@/]+)@([^./]+)\.dfs\.core\.windows\.net(?::\d+)?(?:/(.*))?$")
        .expect("valid abfs pattern")
});
static DFS_HTTPS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)https://([^./]+)\.dfs\.core\.windows\.net/([^/]+)(?:/(.*))?$")
        .expect("valid dfs url pattern")
});
static BLOB_HTTPS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(https?)://([^./]+)\.blob\.core\.windows\.net/([^/]+)(?:/(.*))?$")
        .expect("valid blob url pattern")
});

/// Structural coordinates of a resolved locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ParsedLocation {
    DataLake {
        protocol: String,
        account: String,
        filesystem: String,
        path: String,
    },
    S3 {
        protocol: String,
        bucket: String,
        key: String,
    },
    Gcs {
        bucket: String,
        object: String,
    },
    Blob {
        protocol: String,
        /// Absent for the two-part `container/path` form.
        account: Option<String>,
        container: String,
        path: String,
    },
}

impl ParsedLocation {
    pub fn protocol(&self) -> &str {
        match self {
            ParsedLocation::DataLake { protocol, .. }
            | ParsedLocation::S3 { protocol, .. }
            | ParsedLocation::Blob { protocol, .. } => protocol,
            ParsedLocation::Gcs { .. } => "gs",
        }
    }

    /// Backend kind the engine can scan, if any.
    pub fn storage_kind(&self) -> Option<StorageKind> {
        match self {
            ParsedLocation::DataLake { .. } => Some(StorageKind::DataLake),
            ParsedLocation::Blob { .. } => Some(StorageKind::Blob),
            ParsedLocation::S3 { .. } | ParsedLocation::Gcs { .. } => None,
        }
    }

    /// Where a scan of this location starts.
    ///
    /// `default_account` fills in the account of the bare two-part form.
    pub fn scan_coordinates(&self, default_account: &str) -> Result<ScanCoordinates> {
        match self {
            ParsedLocation::DataLake {
                account,
                filesystem,
                path,
                ..
            } => Ok(ScanCoordinates::new(StorageKind::DataLake, account, filesystem, path)),
            ParsedLocation::Blob {
                account,
                container,
                path,
                ..
            } => Ok(ScanCoordinates::new(
                StorageKind::Blob,
                account.as_deref().unwrap_or(default_account),
                container,
                path,
            )),
            ParsedLocation::S3 { bucket, .. } => Err(ScoutError::UnsupportedBackend(format!(
                "s3 bucket '{}'",
                bucket
            ))),
            ParsedLocation::Gcs { bucket, .. } => Err(ScoutError::UnsupportedBackend(format!(
                "gcs bucket '{}'",
                bucket
            ))),
        }
    }
}

/// Scan root named by a locator: a folder, or a single object when the last
/// path segment carries a file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCoordinates {
    pub kind: StorageKind,
    pub account: String,
    pub container: String,
    pub folder: String,
    pub object: Option<String>,
}

impl ScanCoordinates {
    fn new(kind: StorageKind, account: &str, container: &str, path: &str) -> Self {
        let path = path.trim_matches('/');
        let (folder, last) = path.rsplit_once('/').unwrap_or(("", path));
        let (folder, object) = if has_file_extension(last) {
            (folder.to_string(), Some(path.to_string()))
        } else {
            (path.to_string(), None)
        };
        Self {
            kind,
            account: account.to_string(),
            container: container.to_string(),
            folder,
            object,
        }
    }
}

/// `orders.csv`, `part-0.snappy.parquet`; not `2024.01` or `.hidden`.
fn has_file_extension(segment: &str) -> bool {
    match segment.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && !ext.is_empty()
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && ext.chars().any(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

/// Known locator formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorFormat {
    DataLake,
    S3,
    Gcs,
    Blob,
}

/// Resolution order. Hierarchical and scheme-qualified formats come before
/// the generic path form.
pub const RESOLUTION_ORDER: [LocatorFormat; 4] = [
    LocatorFormat::DataLake,
    LocatorFormat::S3,
    LocatorFormat::Gcs,
    LocatorFormat::Blob,
];

impl LocatorFormat {
    pub fn can_parse(&self, locator: &str) -> bool {
        let lower = locator.to_ascii_lowercase();
        match self {
            LocatorFormat::DataLake => {
                lower.starts_with("abfs://")
                    || lower.starts_with("abfss://")
                    || lower.contains(".dfs.core.windows.net")
            }
            LocatorFormat::S3 => {
                lower.starts_with("s3://") || lower.starts_with("s3a://") || lower.starts_with("s3n://")
            }
            LocatorFormat::Gcs => lower.starts_with("gs://"),
            LocatorFormat::Blob => {
                lower.contains(".blob.core.windows.net") || (!lower.contains("://") && locator.contains('/'))
            }
        }
    }

    pub fn parse(&self, locator: &str) -> std::result::Result<ParsedLocation, String> {
        match self {
            LocatorFormat::DataLake => parse_data_lake(locator),
            LocatorFormat::S3 => parse_bucket_uri(locator).map(|(protocol, bucket, key)| ParsedLocation::S3 {
                protocol,
                bucket,
                key,
            }),
            LocatorFormat::Gcs => {
                parse_bucket_uri(locator).map(|(_, bucket, object)| ParsedLocation::Gcs { bucket, object })
            }
            LocatorFormat::Blob => parse_blob(locator),
        }
    }
}

/// Resolve a locator string into its backend and coordinates.
pub fn resolve(locator: &str) -> Result<ParsedLocation> {
    let trimmed = locator.trim();
    for format in RESOLUTION_ORDER {
        if !format.can_parse(trimmed) {
            continue;
        }
        match format.parse(trimmed) {
            Ok(location) => return Ok(location),
            Err(reason) => {
                debug!(locator = %trimmed, ?format, %reason, "Locator format matched but did not parse");
            }
        }
    }
    Err(ScoutError::UnrecognizedLocatorFormat(trimmed.to_string()))
}

fn parse_data_lake(locator: &str) -> std::result::Result<ParsedLocation, String> {
    if let Some(caps) = ABFS_URI.captures(locator) {
        return Ok(ParsedLocation::DataLake {
            protocol: caps[1].to_ascii_lowercase(),
            filesystem: caps[2].to_string(),
            account: caps[3].to_string(),
            path: clean_path(caps.get(4).map(|m| m.as_str())),
        });
    }
    if let Some(caps) = DFS_HTTPS_URL.captures(locator) {
        return Ok(ParsedLocation::DataLake {
            protocol: "abfss".to_string(),
            account: caps[1].to_string(),
            filesystem: caps[2].to_string(),
            path: clean_path(caps.get(3).map(|m| m.as_str())),
        });
    }
    Err("expected abfs[s]://<filesystem>@<account>.dfs.core.windows.net/<path>".to_string())
}

fn parse_bucket_uri(locator: &str) -> std::result::Result<(String, String, String), String> {
    let (scheme, rest) = locator
        .split_once("://")
        .ok_or_else(|| "missing scheme".to_string())?;
    let (bucket, key) = match rest.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        return Err("missing bucket".to_string());
    }
    Ok((scheme.to_ascii_lowercase(), bucket.to_string(), clean_path(Some(key))))
}

fn parse_blob(locator: &str) -> std::result::Result<ParsedLocation, String> {
    if let Some(caps) = BLOB_HTTPS_URL.captures(locator) {
        return Ok(ParsedLocation::Blob {
            protocol: caps[1].to_ascii_lowercase(),
            account: Some(caps[2].to_string()),
            container: caps[3].to_string(),
            path: clean_path(caps.get(4).map(|m| m.as_str())),
        });
    }
    if locator.contains("://") {
        return Err("not a blob endpoint URL".to_string());
    }

    let parts: Vec<&str> = locator.trim_matches('/').splitn(3, '/').collect();
    let location = match parts.as_slice() {
        [account, container, path] => ParsedLocation::Blob {
            protocol: "https".to_string(),
            account: Some(account.to_string()),
            container: container.to_string(),
            path: clean_path(Some(path)),
        },
        [container, path] => ParsedLocation::Blob {
            protocol: "https".to_string(),
            account: None,
            container: container.to_string(),
            path: clean_path(Some(path)),
        },
        _ => return Err("expected <account>/<container>/<path>".to_string()),
    };
    match &location {
        ParsedLocation::Blob { container, account, .. }
            if container.is_empty() || account.as_deref() == Some("") =>
        {
            Err("empty path segment".to_string())
        }
        _ => Ok(location),
    }
}

fn clean_path(path: Option<&str>) -> String {
    path.unwrap_or("").trim_matches('/').to_string()
}
