//! Schema extraction from a sample window.
//!
//! [`extract_schema`] dispatches on the file format and never fails: any
//! extractor error is logged and turned into an empty schema with the
//! reason recorded on the [`Extraction`].

mod csv;
mod infer;
mod json;
mod parquet;

pub use infer::{infer_json_type, infer_text_type, MAX_INFERENCE_VALUES};

use crate::error::Result;
use crate::sampler::Sample;
use blobscout_protocol::{FileFormat, SchemaDescriptor};
use tracing::warn;

/// Rendered sample values longer than this many characters are cut.
pub const MAX_SAMPLE_VALUE_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Keep column values for display and value-pattern classification.
    /// Type inference still looks at values either way.
    pub capture_sample_values: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            capture_sample_values: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extraction {
    pub schema: SchemaDescriptor,
    /// Values seen per column, parallel to `schema.columns`, at most
    /// [`MAX_INFERENCE_VALUES`] each. Empty when values are not captured.
    pub column_values: Vec<Vec<String>>,
    /// Why the schema is empty or partial.
    pub degraded: Option<String>,
}

impl Extraction {
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            degraded: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn values_for(&self, index: usize) -> &[String] {
        self.column_values.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub fn extract_schema(format: FileFormat, sample: Option<&Sample>, options: &ExtractOptions) -> Extraction {
    if format == FileFormat::Unknown {
        return Extraction::default();
    }
    let Some(sample) = sample else {
        return Extraction::unknown("no sample available");
    };

    let result: Result<Extraction> = match format {
        FileFormat::Csv => csv::extract(&sample.bytes, sample.truncated()),
        FileFormat::Json => json::extract(&sample.bytes, sample.truncated()),
        FileFormat::Parquet => parquet::extract(&sample.bytes),
        FileFormat::Unknown => Ok(Extraction::default()),
    };

    match result {
        Ok(mut extraction) => {
            if !options.capture_sample_values {
                for column in &mut extraction.schema.columns {
                    column.sample_values.clear();
                }
                extraction.column_values.clear();
            }
            extraction
        }
        Err(e) => {
            warn!(%format, bytes = sample.bytes.len(), error = %e, "Schema extraction failed");
            Extraction::unknown(e.to_string())
        }
    }
}

/// Cut a rendered value to [`MAX_SAMPLE_VALUE_CHARS`] characters.
pub(crate) fn truncate_value(value: &str) -> String {
    if value.chars().count() > MAX_SAMPLE_VALUE_CHARS {
        let cut: String = value.chars().take(MAX_SAMPLE_VALUE_CHARS).collect();
        format!("{}...", cut)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobscout_protocol::SampleWindow;
    use bytes::Bytes;

    fn sample(data: &'static [u8], object_size: u64) -> Sample {
        Sample {
            bytes: Bytes::from_static(data),
            window: SampleWindow::Head,
            object_size,
        }
    }

    #[test]
    fn unknown_formats_and_missing_samples_are_empty() {
        let s = sample(b"whatever", 8);
        let unknown = extract_schema(FileFormat::Unknown, Some(&s), &ExtractOptions::default());
        assert!(unknown.schema.is_empty());
        assert_eq!(unknown.schema.num_columns, 0);
        assert!(unknown.degraded.is_none());

        let missing = extract_schema(FileFormat::Csv, None, &ExtractOptions::default());
        assert!(missing.schema.is_empty());
        assert!(missing.degraded.is_some());
    }

    #[test]
    fn malformed_input_degrades() {
        let s = sample(b"not parquet at all", 18);
        let extraction = extract_schema(FileFormat::Parquet, Some(&s), &ExtractOptions::default());
        assert!(extraction.schema.is_empty());
        assert!(extraction.degraded.is_some());

        let s = sample(b"{{{{", 4);
        let extraction = extract_schema(FileFormat::Json, Some(&s), &ExtractOptions::default());
        assert!(extraction.schema.is_empty());
        assert!(extraction.degraded.is_some());
    }

    #[test]
    fn values_can_be_withheld() {
        let s = sample(b"id,email\n1,a@b.io\n2,c@d.io\n", 27);
        let options = ExtractOptions {
            capture_sample_values: false,
        };
        let extraction = extract_schema(FileFormat::Csv, Some(&s), &options);
        assert_eq!(extraction.schema.num_columns, 2);
        assert!(extraction.schema.columns.iter().all(|c| c.sample_values.is_empty()));
        assert!(extraction.values_for(1).is_empty());
        // Typing still used the rows.
        assert_eq!(extraction.schema.columns[0].inferred_type.to_string(), "int64");
    }

    #[test]
    fn long_values_are_cut() {
        let long = "x".repeat(150);
        let cut = truncate_value(&long);
        assert_eq!(cut.len(), 103);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_value("short"), "short");
    }
}
