//! `inspect` - run the per-object pipeline against one local file
//!
//! The file's parent directory is served as a container through the local
//! storage emulator, so sampling reads exactly the window a scan would.

use crate::cli::error::HelpfulError;
use crate::cli::output::print_json;
use crate::cli::{require_file, runtime};
use anyhow::{Context, Result};
use blobscout::backend::{FsEmulatorBackend, StorageBackend};
use blobscout::lister::descriptor_from_entry;
use blobscout::metadata::{build_draft, ObjectAnalyzer};
use blobscout::{ExtractOptions, PiiClassifier, SamplePolicy, Sampler, StorageTarget};
use blobscout_protocol::StorageKind;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const LOCAL_ACCOUNT: &str = "local";

#[derive(Debug)]
pub struct InspectArgs {
    pub file: PathBuf,
    pub data_lake: bool,
    pub names_only: bool,
}

pub fn run(args: InspectArgs) -> Result<()> {
    require_file(&args.file)?;
    let file = args
        .file
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", args.file.display()))?;

    let (root, container, name) = match (
        file.parent().and_then(|p| p.parent()),
        file.parent().and_then(|p| p.file_name()),
        file.file_name(),
    ) {
        (Some(root), Some(container), Some(name)) => (
            root.to_path_buf(),
            container.to_string_lossy().into_owned(),
            name.to_string_lossy().into_owned(),
        ),
        _ => return Err(HelpfulError::no_container_dir(&file).into()),
    };

    let kind = if args.data_lake { StorageKind::DataLake } else { StorageKind::Blob };
    let output = runtime()?.block_on(async {
        let backend: Arc<dyn StorageBackend> = Arc::new(FsEmulatorBackend::new(&root)?);
        let object = descriptor_from_entry(backend.properties(&container, &name).await?);

        let call_timeout = Duration::from_secs(30);
        let sampler = Sampler::new(backend, SamplePolicy::for_backend(kind), call_timeout);
        let analyzer = ObjectAnalyzer::new(
            sampler,
            PiiClassifier::local(),
            ExtractOptions {
                capture_sample_values: !args.names_only,
            },
        );
        let analysis = analyzer.analyze(&container, &object).await;

        let target = StorageTarget::new(kind, LOCAL_ACCOUNT, &container, "");
        let draft = build_draft(&target, &object, &analysis)?;
        anyhow::Ok(json!({
            "storage_path": draft.key.storage_path,
            "file_hash": draft.file_hash,
            "schema_hash": draft.schema_hash,
            "data_classification": draft.data_classification,
            "file_metadata": draft.file_metadata,
            "schema": draft.schema,
        }))
    })?;

    print_json(&output)
}
