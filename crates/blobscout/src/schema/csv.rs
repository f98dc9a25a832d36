//! CSV: the first non-empty line is the header, complete rows after it
//! feed type inference.

use super::infer::{infer_text_type, MAX_INFERENCE_VALUES};
use super::{truncate_value, Extraction};
use crate::error::Result;
use blobscout_protocol::{ColumnDescriptor, SchemaDescriptor};
use serde_json::Value;

pub(super) fn extract(bytes: &[u8], truncated: bool) -> Result<Extraction> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}');

    // A window that stops mid-object ends in a partial row.
    let mut degraded = None;
    let complete = if truncated {
        match text.rfind('\n') {
            Some(end) => &text[..=end],
            None => {
                degraded = Some("header line cut by the sample window".to_string());
                text
            }
        }
    } else {
        text
    };

    let body = complete.trim_start_matches(|c: char| c.is_whitespace());
    if body.is_empty() {
        return Ok(Extraction::default());
    }

    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());
    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record?,
        None => return Ok(Extraction::default()),
    };
    let names: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let name = name.trim();
            if name.is_empty() {
                format!("column_{}", i + 1)
            } else {
                name.to_string()
            }
        })
        .collect();

    let mut column_values: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    let mut rows = 0usize;
    for record in records {
        // Rows past a quoting error are not trusted.
        let Ok(record) = record else { break };
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows += 1;
        for (values, field) in column_values.iter_mut().zip(record.iter()) {
            let field = field.trim();
            if !field.is_empty() && values.len() < MAX_INFERENCE_VALUES {
                values.push(field.to_string());
            }
        }
    }

    let columns: Vec<ColumnDescriptor> = names
        .into_iter()
        .zip(&column_values)
        .map(|(name, values)| {
            ColumnDescriptor::new(name, infer_text_type(values))
                .with_nullable(true)
                .with_samples(values.iter().map(|v| truncate_value(v)))
        })
        .collect();

    let schema = SchemaDescriptor::from_columns(columns, None)
        .with_format_detail("has_header", true)
        .with_format_detail("delimiter", ",")
        .with_format_detail("sample_rows_count", Value::from(rows as u64));

    Ok(Extraction {
        schema,
        column_values,
        degraded,
    })
}
