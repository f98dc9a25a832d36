//! Shared data model for blobscout.
//!
//! Everything that crosses a crate boundary lives here: the storage kinds,
//! discovered object descriptors, inferred schemas, PII annotations and the
//! metadata blobs persisted in the catalog. Hashing helpers (content
//! fingerprints and schema hashes) are in [`hashing`] so that every producer
//! computes them the same way.

pub mod error;
pub mod hashing;
pub mod types;

pub use error::{ProtocolError, Result};
pub use hashing::{canonical_json, digest_128, fingerprint, schema_hash, FINGERPRINT_ALGORITHM};
pub use types::{
    ColumnDescriptor, ContentFingerprint, DataClassification, FileFormat, FileMetadata,
    InferredType, ObjectDescriptor, PiiSummary, PiiType, SampleSummary, SampleWindow,
    SchemaDescriptor, StorageKind, StorageMetadata,
};
