//! Content fingerprints and schema hashes.
//!
//! Both digests are 128-bit blake3 outputs rendered as lowercase hex. The
//! fingerprint is derived from backend-reported metadata only; the schema
//! hash is taken over a canonical (key-sorted, compact) JSON rendering so
//! that construction order never changes the result.

use crate::error::Result;
use crate::types::{ContentFingerprint, ObjectDescriptor, SchemaDescriptor};
use blake3::Hasher;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

pub const FINGERPRINT_ALGORITHM: &str = "blake3-128";

const DIGEST_BYTES: usize = 16;

/// 128-bit blake3 digest of `data` as hex.
pub fn digest_128(data: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(data);
    let mut out = [0u8; DIGEST_BYTES];
    hasher.finalize_xof().fill(&mut out);
    hex::encode(out)
}

/// Identity string hashed into a fingerprint: `etag_size_lastModified`.
///
/// Surrounding quotes on the etag are dropped; a missing timestamp
/// contributes an empty string.
pub fn fingerprint_input(etag: &str, size_bytes: u64, last_modified: Option<DateTime<Utc>>) -> String {
    let etag = etag.trim().trim_matches('"');
    let modified = last_modified
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .unwrap_or_default();
    format!("{}_{}_{}", etag, size_bytes, modified)
}

/// Fingerprint an object from its listing metadata. No object bytes are read.
pub fn fingerprint(object: &ObjectDescriptor) -> ContentFingerprint {
    let input = fingerprint_input(&object.etag, object.size_bytes, object.last_modified);
    ContentFingerprint {
        algorithm: FINGERPRINT_ALGORITHM.to_string(),
        value: digest_128(input.as_bytes()),
    }
}

/// Compact JSON with every object's keys sorted, recursively.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&canonicalize(value))?)
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Hash of the canonical rendering of a schema descriptor.
///
/// Column order is part of the schema; map keys and set members are not
/// order-sensitive.
pub fn schema_hash(schema: &SchemaDescriptor) -> Result<String> {
    let canonical = canonical_json(schema)?;
    Ok(digest_128(canonical.as_bytes()))
}
