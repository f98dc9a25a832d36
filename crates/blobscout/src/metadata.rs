//! Per-object analysis and record assembly.
//!
//! [`ObjectAnalyzer`] runs the read-only stages for one object (fingerprint,
//! sample, schema, PII). [`build_draft`] turns the result into the normalized
//! record content handed to the dedup engine.

use crate::error::Result;
use crate::pii::{data_classification, PiiClassifier};
use crate::sampler::{fingerprint, Sampler};
use crate::schema::{extract_schema, ExtractOptions, Extraction};
use crate::types::StorageTarget;
use blobscout_catalog::{RecordDraft, RecordKey};
use blobscout_protocol::{
    schema_hash, ContentFingerprint, FileMetadata, ObjectDescriptor, PiiSummary, SampleSummary,
    StorageKind, StorageMetadata,
};

/// Outcome of the read-only stages for one object.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub fingerprint: ContentFingerprint,
    pub sample: SampleSummary,
    pub extraction: Extraction,
}

pub struct ObjectAnalyzer {
    sampler: Sampler,
    classifier: PiiClassifier,
    options: ExtractOptions,
}

impl ObjectAnalyzer {
    pub fn new(sampler: Sampler, classifier: PiiClassifier, options: ExtractOptions) -> Self {
        Self {
            sampler,
            classifier,
            options,
        }
    }

    /// Never fails; a missing sample or a bad document leaves an empty
    /// schema and the reason in `sample.degraded`.
    pub async fn analyze(&self, container: &str, object: &ObjectDescriptor) -> Analysis {
        let fingerprint = fingerprint(object);
        let outcome = self.sampler.sample(container, object).await;
        let mut extraction = extract_schema(object.format(), outcome.sample(), &self.options);
        self.classifier.classify_schema(&mut extraction).await;

        let mut sample = outcome.summary();
        if sample.degraded.is_none() {
            sample.degraded = extraction.degraded.clone();
        }
        Analysis {
            fingerprint,
            sample,
            extraction,
        }
    }
}

/// Canonical URI of an object.
pub fn object_uri(kind: StorageKind, account: &str, container: &str, path: &str) -> String {
    match kind {
        StorageKind::Blob => format!("https://{}.blob.core.windows.net/{}/{}", account, container, path),
        StorageKind::DataLake => format!("abfss://{}@{}.dfs.core.windows.net/{}", container, account, path),
    }
}

/// Dedup key of an object: storage type, account, `container/path`.
pub fn record_key(target: &StorageTarget, object: &ObjectDescriptor) -> RecordKey {
    RecordKey::new(
        target.backend.storage_type(),
        target.account_name.as_str(),
        format!("{}/{}", target.container, object.full_path),
    )
}

pub fn build_draft(target: &StorageTarget, object: &ObjectDescriptor, analysis: &Analysis) -> Result<RecordDraft> {
    let schema = analysis.extraction.schema.clone();
    let pii_summary = PiiSummary::from_schema(&schema);
    let classification = data_classification(&pii_summary.pii_types_found);

    let file_metadata = FileMetadata {
        file_name: object.name.clone(),
        file_extension: object.extension(),
        file_format: object.format(),
        file_size: object.size_bytes,
        content_type: object.content_type.clone(),
        etag: object.etag.clone(),
        last_modified: object.last_modified,
        created_at: object.created_at,
        num_columns: schema.num_columns,
        num_rows: schema.num_rows,
        data_classification: classification,
        pii_summary,
        sample: analysis.sample.clone(),
    };

    let storage_metadata = StorageMetadata {
        storage_type: target.backend.storage_type().to_string(),
        account_name: target.account_name.clone(),
        container: target.container.clone(),
        folder_prefix: target.folder_prefix.clone(),
        full_path: object.full_path.clone(),
        uri: object_uri(target.backend, &target.account_name, &target.container, &object.full_path),
        backend_specific: object.backend_specific.clone(),
    };

    Ok(RecordDraft {
        key: record_key(target, object),
        file_name: object.name.clone(),
        folder_path: object.folder_path().to_string(),
        file_hash: analysis.fingerprint.value.clone(),
        schema_hash: schema_hash(&schema)?,
        file_metadata,
        schema,
        storage_metadata,
        data_classification: classification,
        environment: target.labels.environment.clone(),
        env_type: target.labels.env_type.clone(),
        data_source_type: target.labels.data_source_type.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, StorageBackend};
    use crate::sampler::SamplePolicy;
    use blobscout_protocol::{DataClassification, PiiType};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn analyzer(backend: Arc<MemoryBackend>) -> ObjectAnalyzer {
        let sampler = Sampler::new(backend, SamplePolicy::for_backend(StorageKind::Blob), Duration::from_secs(5));
        ObjectAnalyzer::new(sampler, PiiClassifier::local(), ExtractOptions::default())
    }

    async fn descriptor(backend: &MemoryBackend, container: &str, path: &str) -> ObjectDescriptor {
        let props = backend.properties(container, path).await.unwrap();
        ObjectDescriptor {
            name: path.rsplit('/').next().unwrap().to_string(),
            full_path: path.to_string(),
            size_bytes: props.size_bytes,
            etag: props.etag,
            last_modified: props.last_modified,
            created_at: props.created_at,
            content_type: props.content_type,
            backend_specific: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn csv_object_becomes_a_confidential_draft() {
        let backend = Arc::new(MemoryBackend::new());
        backend.put("raw", "sales/2024/customers.csv", b"id,customer_email,street\n1,a@b.io,Main St\n".to_vec());
        let object = descriptor(&backend, "raw", "sales/2024/customers.csv").await;
        let target = StorageTarget::new(StorageKind::Blob, "acct", "raw", "sales");

        let analysis = analyzer(backend).analyze("raw", &object).await;
        assert!(analysis.sample.degraded.is_none());
        let draft = build_draft(&target, &object, &analysis).unwrap();

        assert_eq!(draft.key, RecordKey::new("azure_blob", "acct", "raw/sales/2024/customers.csv"));
        assert_eq!(draft.folder_path, "sales/2024");
        assert_eq!(draft.file_hash.len(), 32);
        assert_eq!(draft.schema_hash.len(), 32);
        assert_eq!(draft.data_classification, DataClassification::Confidential);
        assert_eq!(
            draft.storage_metadata.uri,
            "https://acct.blob.core.windows.net/raw/sales/2024/customers.csv"
        );

        let pii = &draft.file_metadata.pii_summary;
        assert_eq!(pii.total_columns, 3);
        assert_eq!(pii.columns_with_pii, vec!["customer_email", "street"]);
        assert!(pii.pii_types_found.contains(&PiiType::Address));
        assert_eq!(draft.environment, "prod");
    }

    #[tokio::test]
    async fn unreadable_object_still_produces_a_draft() {
        let backend = Arc::new(MemoryBackend::new());
        backend.put("fs", "data/events.parquet", b"not really parquet".to_vec());
        backend.fail_reads("data/events.parquet");
        let object = ObjectDescriptor {
            name: "events.parquet".to_string(),
            full_path: "data/events.parquet".to_string(),
            size_bytes: 18,
            etag: "\"0x9\"".to_string(),
            last_modified: None,
            created_at: None,
            content_type: None,
            backend_specific: BTreeMap::new(),
        };
        let target = StorageTarget::new(StorageKind::DataLake, "lake", "fs", "data");

        let analysis = analyzer(backend).analyze("fs", &object).await;
        assert!(analysis.sample.degraded.is_some());
        let draft = build_draft(&target, &object, &analysis).unwrap();

        assert!(draft.schema.is_empty());
        assert_eq!(draft.data_classification, DataClassification::Internal);
        assert_eq!(draft.key.storage_type, "azure_datalake");
        assert_eq!(
            draft.storage_metadata.uri,
            "abfss://fs@lake.dfs.core.windows.net/data/events.parquet"
        );
    }
}
