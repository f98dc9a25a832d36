//! Typed records shared by the discovery engine and the catalog.

use crate::error::ProtocolError;
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Storage
// ============================================================================

/// Backend family a storage target belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Flat-namespace blob containers.
    Blob,
    /// Hierarchical filesystems (directories are real entries).
    DataLake,
}

impl StorageKind {
    /// Value written to the catalog's `storage_type` column.
    pub fn storage_type(&self) -> &'static str {
        match self {
            StorageKind::Blob => "azure_blob",
            StorageKind::DataLake => "azure_datalake",
        }
    }

    /// Default access protocol used when rendering a full object URI.
    pub fn protocol(&self) -> &'static str {
        match self {
            StorageKind::Blob => "https",
            StorageKind::DataLake => "abfss",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Blob => "blob",
            StorageKind::DataLake => "data_lake",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blob" | "azure_blob" => Ok(StorageKind::Blob),
            "data_lake" | "datalake" | "adls" | "azure_datalake" => Ok(StorageKind::DataLake),
            other => Err(ProtocolError::invalid("storage kind", other)),
        }
    }
}

/// One object as reported by a backend listing.
///
/// Built fresh on every listing call and never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// Last path segment.
    pub name: String,
    /// Path inside the container/filesystem, without a leading slash.
    pub full_path: String,
    pub size_bytes: u64,
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    #[serde(default)]
    pub backend_specific: BTreeMap<String, Value>,
}

impl ObjectDescriptor {
    /// Lowercased extension of the object name, without the dot.
    pub fn extension(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => String::new(),
        }
    }

    /// Parent "folder" of the object inside its container.
    pub fn folder_path(&self) -> &str {
        match self.full_path.rsplit_once('/') {
            Some((parent, _)) => parent,
            None => "",
        }
    }

    pub fn format(&self) -> FileFormat {
        FileFormat::from_extension(&self.extension())
    }
}

/// Metadata-derived identity digest of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentFingerprint {
    pub algorithm: String,
    pub value: String,
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

/// Formats with a dedicated schema extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Json,
    Parquet,
    Unknown,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" => FileFormat::Csv,
            "json" | "jsonl" | "ndjson" => FileFormat::Json,
            "parquet" => FileFormat::Parquet,
            _ => FileFormat::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
            FileFormat::Parquet => "parquet",
            FileFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which end of an object a sample was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleWindow {
    Head,
    Tail,
}

// ============================================================================
// Schema
// ============================================================================

/// Column type inferred from a sample.
///
/// Serialized as a plain string (`"int64"`, `"array<string>"`, `"array"` for
/// an array whose element type could not be determined).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InferredType {
    Int64,
    Double,
    Bool,
    Date,
    String,
    Null,
    Object,
    Array(Option<Box<InferredType>>),
}

impl InferredType {
    pub fn array_of(item: InferredType) -> Self {
        InferredType::Array(Some(Box::new(item)))
    }

    pub fn type_name(&self) -> String {
        match self {
            InferredType::Int64 => "int64".to_string(),
            InferredType::Double => "double".to_string(),
            InferredType::Bool => "bool".to_string(),
            InferredType::Date => "date".to_string(),
            InferredType::String => "string".to_string(),
            InferredType::Null => "null".to_string(),
            InferredType::Object => "object".to_string(),
            InferredType::Array(None) => "array".to_string(),
            InferredType::Array(Some(item)) => format!("array<{}>", item.type_name()),
        }
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

impl FromStr for InferredType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if let Some(inner) = raw
            .strip_prefix("array<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return Ok(InferredType::array_of(inner.parse()?));
        }
        match raw {
            "int64" => Ok(InferredType::Int64),
            "double" => Ok(InferredType::Double),
            "bool" => Ok(InferredType::Bool),
            "date" => Ok(InferredType::Date),
            "string" => Ok(InferredType::String),
            "null" => Ok(InferredType::Null),
            "object" => Ok(InferredType::Object),
            "array" => Ok(InferredType::Array(None)),
            other => Err(ProtocolError::invalid("inferred type", other)),
        }
    }
}

impl Serialize for InferredType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.type_name())
    }
}

impl<'de> Deserialize<'de> for InferredType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// One column of an inferred schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub inferred_type: InferredType,
    pub nullable: bool,
    /// At most two values, only when value capture is enabled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_values: Vec<String>,
    #[serde(default)]
    pub pii_detected: bool,
    #[serde(default)]
    pub pii_types: BTreeSet<PiiType>,
}

impl ColumnDescriptor {
    pub const MAX_SAMPLE_VALUES: usize = 2;

    pub fn new(name: impl Into<String>, inferred_type: InferredType) -> Self {
        Self {
            name: name.into(),
            inferred_type,
            nullable: true,
            sample_values: Vec::new(),
            pii_detected: false,
            pii_types: BTreeSet::new(),
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_samples<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sample_values = values
            .into_iter()
            .take(Self::MAX_SAMPLE_VALUES)
            .map(Into::into)
            .collect();
        self
    }
}

/// Structural description of an object, inferred from its sample only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub columns: Vec<ColumnDescriptor>,
    pub num_columns: usize,
    pub num_rows: Option<u64>,
    #[serde(default)]
    pub format_specific: BTreeMap<String, Value>,
}

impl SchemaDescriptor {
    /// The "schema unknown" descriptor.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<ColumnDescriptor>, num_rows: Option<u64>) -> Self {
        Self {
            num_columns: columns.len(),
            columns,
            num_rows,
            format_specific: BTreeMap::new(),
        }
    }

    pub fn with_format_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.format_specific.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }
}

// ============================================================================
// PII
// ============================================================================

/// Category of personally identifiable information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PiiType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    Name,
    Address,
    DateOfBirth,
    Ip,
    Passport,
    DriverLicense,
    BankAccount,
    /// Category reported by an external entity recognizer with no local equivalent.
    Other(String),
}

impl PiiType {
    pub fn as_str(&self) -> &str {
        match self {
            PiiType::Email => "email",
            PiiType::Phone => "phone",
            PiiType::Ssn => "ssn",
            PiiType::CreditCard => "credit_card",
            PiiType::Name => "name",
            PiiType::Address => "address",
            PiiType::DateOfBirth => "date_of_birth",
            PiiType::Ip => "ip",
            PiiType::Passport => "passport",
            PiiType::DriverLicense => "driver_license",
            PiiType::BankAccount => "bank_account",
            PiiType::Other(name) => name,
        }
    }

    /// Types that make a record `Confidential` on their own.
    pub fn is_highly_sensitive(&self) -> bool {
        matches!(
            self,
            PiiType::CreditCard
                | PiiType::Ssn
                | PiiType::Passport
                | PiiType::DriverLicense
                | PiiType::BankAccount
                | PiiType::Email
                | PiiType::Phone
        )
    }
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for PiiType {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "email" => PiiType::Email,
            "phone" => PiiType::Phone,
            "ssn" => PiiType::Ssn,
            "credit_card" => PiiType::CreditCard,
            "name" => PiiType::Name,
            "address" => PiiType::Address,
            "date_of_birth" => PiiType::DateOfBirth,
            "ip" => PiiType::Ip,
            "passport" => PiiType::Passport,
            "driver_license" => PiiType::DriverLicense,
            "bank_account" => PiiType::BankAccount,
            other => PiiType::Other(other.to_string()),
        }
    }
}

impl Serialize for PiiType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PiiType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(PiiType::from(raw.as_str()))
    }
}

/// Record-level sensitivity label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum DataClassification {
    #[default]
    Internal,
    Restricted,
    Confidential,
}

impl DataClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataClassification::Internal => "Internal",
            DataClassification::Restricted => "Restricted",
            DataClassification::Confidential => "Confidential",
        }
    }
}

impl fmt::Display for DataClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataClassification {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" => Ok(DataClassification::Internal),
            "restricted" => Ok(DataClassification::Restricted),
            "confidential" => Ok(DataClassification::Confidential),
            other => Err(ProtocolError::invalid("data classification", other)),
        }
    }
}

/// Aggregated PII findings over all columns of one object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PiiSummary {
    pub total_columns: usize,
    pub pii_columns_count: usize,
    pub pii_types_found: BTreeSet<PiiType>,
    pub columns_with_pii: Vec<String>,
}

impl PiiSummary {
    pub fn from_schema(schema: &SchemaDescriptor) -> Self {
        let mut summary = PiiSummary {
            total_columns: schema.columns.len(),
            ..PiiSummary::default()
        };
        for column in schema.columns.iter().filter(|c| c.pii_detected) {
            summary.pii_columns_count += 1;
            summary.columns_with_pii.push(column.name.clone());
            summary.pii_types_found.extend(column.pii_types.iter().cloned());
        }
        summary
    }
}

// ============================================================================
// Catalog blobs
// ============================================================================

/// How the sample behind a schema was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SampleSummary {
    pub window: Option<SampleWindow>,
    pub bytes_read: u64,
    /// Why the schema is unknown or partial, when it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

/// File-level metadata persisted as the catalog's `file_metadata` blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_name: String,
    pub file_extension: String,
    pub file_format: FileFormat,
    pub file_size: u64,
    pub content_type: Option<String>,
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub num_columns: usize,
    pub num_rows: Option<u64>,
    pub data_classification: DataClassification,
    pub pii_summary: PiiSummary,
    pub sample: SampleSummary,
}

/// Where an object lives, persisted as the catalog's `storage_metadata` blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageMetadata {
    pub storage_type: String,
    pub account_name: String,
    pub container: String,
    pub folder_prefix: String,
    pub full_path: String,
    pub uri: String,
    #[serde(default)]
    pub backend_specific: BTreeMap<String, Value>,
}
