//! `resolve` - show how a storage locator is interpreted

use crate::cli::error::HelpfulError;
use crate::cli::output::{print_json, print_table};
use anyhow::Result;
use blobscout::{ParsedLocation, ScoutError};

pub fn run(locator: &str, json: bool) -> Result<()> {
    let location = match blobscout::resolve(locator) {
        Ok(location) => location,
        Err(ScoutError::UnrecognizedLocatorFormat(_)) => {
            return Err(HelpfulError::unrecognized_locator(locator).into())
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        return print_json(&location);
    }

    let mut rows = vec![vec!["protocol".to_string(), location.protocol().to_string()]];
    rows.extend(fields(&location).into_iter().map(|(k, v)| vec![k.to_string(), v]));
    let scannable = match location.storage_kind() {
        Some(kind) => kind.to_string(),
        None => "no (unsupported backend)".to_string(),
    };
    rows.push(vec!["scannable".to_string(), scannable]);
    print_table(&["FIELD", "VALUE"], rows);
    Ok(())
}

fn fields(location: &ParsedLocation) -> Vec<(&'static str, String)> {
    match location {
        ParsedLocation::DataLake {
            account,
            filesystem,
            path,
            ..
        } => vec![
            ("format", "data_lake".to_string()),
            ("account", account.clone()),
            ("filesystem", filesystem.clone()),
            ("path", path.clone()),
        ],
        ParsedLocation::S3 { bucket, key, .. } => vec![
            ("format", "s3".to_string()),
            ("bucket", bucket.clone()),
            ("key", key.clone()),
        ],
        ParsedLocation::Gcs { bucket, object } => vec![
            ("format", "gcs".to_string()),
            ("bucket", bucket.clone()),
            ("object", object.clone()),
        ],
        ParsedLocation::Blob {
            account,
            container,
            path,
            ..
        } => vec![
            ("format", "blob".to_string()),
            ("account", account.clone().unwrap_or_else(|| "(default)".to_string())),
            ("container", container.clone()),
            ("path", path.clone()),
        ],
    }
}
