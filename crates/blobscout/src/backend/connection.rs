//! `Key=Value;` connection strings.

use crate::error::{Result, ScoutError};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Parsed connection string. Keys are matched case-insensitively.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pairs: BTreeMap<String, String>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut pairs = BTreeMap::new();
        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            // Values (account keys) may themselves contain '='.
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                ScoutError::Config(format!("malformed connection string segment '{}'", redact(segment)))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ScoutError::Config("connection string key must not be empty".to_string()));
            }
            pairs.insert(key.to_ascii_lowercase(), value.trim().to_string());
        }
        if pairs.is_empty() {
            return Err(ScoutError::Config("connection string is empty".to_string()));
        }
        Ok(Self { pairs })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn account_name(&self) -> Option<&str> {
        self.get("AccountName")
    }

    /// Local directory served by the storage emulator.
    pub fn local_root(&self) -> Option<PathBuf> {
        self.get("LocalRoot")
            .filter(|root| !root.is_empty())
            .map(PathBuf::from)
    }
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.pairs.keys().map(String::as_str).collect();
        f.debug_struct("ConnectionString").field("keys", &keys).finish()
    }
}

fn redact(segment: &str) -> String {
    format!("{}...", segment.chars().take(4).collect::<String>())
}
