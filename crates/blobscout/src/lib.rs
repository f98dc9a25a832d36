//! Blobscout - storage discovery and metadata deduplication
//!
//! Walks object storage accounts, reads a small byte window from each data
//! file, infers its schema, flags PII-bearing columns and keeps one catalog
//! record per object up to date.
//!
//! # Pipeline
//!
//! ```text
//! locator ─► StorageTarget ─► ObjectLister ─► Sampler ─► extract_schema
//!                                                          │
//!                      CatalogStore ◄─ DedupEngine ◄─ PiiClassifier
//! ```
//!
//! Storage access goes through [`backend::StorageBackend`] and persistence
//! through [`blobscout_catalog::CatalogStore`], both injected at
//! construction, so every stage runs against in-memory fakes in tests.

pub mod backend;
pub mod config;
pub mod dedup;
pub mod error;
pub mod lister;
pub mod locator;
pub mod metadata;
pub mod pii;
pub mod sampler;
pub mod scanner;
pub mod schema;
pub mod types;

pub use config::{AccountConfig, AuthConfig, DiscoveryConfig, SamplingConfig};
pub use dedup::{decide, DedupEngine, DedupOutcome, UpsertDecision};
pub use error::{Result, ScoutError};
pub use lister::{lister_for, ListingItem, ObjectLister};
pub use locator::{resolve, ParsedLocation, ScanCoordinates};
pub use pii::{classify, EntityRecognizer, PiiClassifier};
pub use sampler::{SampleOutcome, SamplePolicy, Sampler};
pub use scanner::{ScanCancelToken, ScanConfig, ScanReport, ScanStats, Scanner};
pub use schema::{extract_schema, ExtractOptions, Extraction};
pub use types::{StorageTarget, TargetLabels};
