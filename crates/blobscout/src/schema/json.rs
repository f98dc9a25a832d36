//! JSON documents, arrays and JSON Lines.
//!
//! A head window of a large document is almost always cut mid-value. When
//! that happens the leading complete members of the top-level array or
//! object are recovered and the schema is built from those.

use super::infer::{infer_json_type, MAX_INFERENCE_VALUES};
use super::{truncate_value, Extraction};
use crate::error::{Result, ScoutError};
use blobscout_protocol::{ColumnDescriptor, InferredType, SchemaDescriptor};
use serde_json::{Deserializer, Map, Value};

/// Items whose keys make up the columns of an array of objects.
const KEY_UNION_ITEMS: usize = 2;

enum Document {
    Whole(Value),
    Lines(Vec<Value>),
}

pub(super) fn extract(bytes: &[u8], truncated: bool) -> Result<Extraction> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return Ok(Extraction::default());
    }

    let mut recovered = false;
    let document = match serde_json::from_str::<Value>(text) {
        Ok(value) => Document::Whole(value),
        Err(parse_error) => match parse_lines(text, truncated) {
            Some(items) => Document::Lines(items),
            None if truncated => {
                let value = recover_leading(text).ok_or_else(|| {
                    ScoutError::SchemaInference(format!(
                        "no complete JSON value in truncated sample: {}",
                        parse_error
                    ))
                })?;
                recovered = true;
                Document::Whole(value)
            }
            None => return Err(parse_error.into()),
        },
    };

    let (columns, column_values, structure, num_items) = match &document {
        Document::Whole(Value::Object(map)) => {
            let (columns, values) = object_columns(map);
            (columns, values, "object", None)
        }
        Document::Whole(Value::Array(items)) => {
            let (columns, values) = match items.first() {
                None => (Vec::new(), Vec::new()),
                Some(Value::Object(_)) => array_columns(items),
                Some(_) => scalar_columns(items),
            };
            (columns, values, "array", Some(items.len()))
        }
        Document::Whole(scalar) => {
            let (columns, values) = scalar_columns(std::slice::from_ref(scalar));
            (columns, values, "scalar", None)
        }
        Document::Lines(items) => {
            let (columns, values) = array_columns(items);
            (columns, values, "lines", Some(items.len()))
        }
    };

    let mut schema =
        SchemaDescriptor::from_columns(columns, None).with_format_detail("structure", structure);
    if let Some(count) = num_items {
        schema = schema.with_format_detail("num_items", count as u64);
    }
    if recovered {
        schema = schema.with_format_detail("recovered_from_truncation", true);
    }

    Ok(Extraction {
        schema,
        column_values,
        degraded: None,
    })
}

/// One JSON object per line. The last line may be cut off when the window
/// is truncated; any other bad line means this is not JSON Lines.
fn parse_lines(text: &str, truncated: bool) -> Option<Vec<Value>> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() < 2 && !truncated {
        return None;
    }

    let mut items = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str::<Value>(line) {
            Ok(value) => items.push(value),
            Err(_) if truncated && i + 1 == lines.len() => break,
            Err(_) => return None,
        }
    }
    match items.first() {
        Some(Value::Object(_)) => Some(items),
        _ => None,
    }
}

fn recover_leading(text: &str) -> Option<Value> {
    if let Some(body) = text.strip_prefix('[') {
        let items = recover_array(body);
        (!items.is_empty()).then_some(Value::Array(items))
    } else if let Some(body) = text.strip_prefix('{') {
        let members = recover_object(body);
        (!members.is_empty()).then_some(Value::Object(members))
    } else {
        None
    }
}

/// Next complete value at the start of `text`, and the text after it.
fn next_value<'a, T: serde::de::DeserializeOwned>(text: &'a str) -> Option<(T, &'a str)> {
    let text = text.trim_start();
    let mut stream = Deserializer::from_str(text).into_iter::<T>();
    match stream.next() {
        Some(Ok(value)) => Some((value, text[stream.byte_offset()..].trim_start())),
        _ => None,
    }
}

/// A value only counts once the delimiter after it has been seen; a number
/// at the very end of the window may itself be cut.
fn recover_array(body: &str) -> Vec<Value> {
    let mut items = Vec::new();
    let mut rest = body;
    while let Some((value, after)) = next_value::<Value>(rest) {
        match after.chars().next() {
            Some(',') => {
                items.push(value);
                rest = &after[1..];
            }
            Some(']') => {
                items.push(value);
                break;
            }
            _ => break,
        }
    }
    items
}

fn recover_object(body: &str) -> Map<String, Value> {
    let mut members = Map::new();
    let mut rest = body;
    while let Some((key, after_key)) = next_value::<String>(rest) {
        let Some(value_text) = after_key.strip_prefix(':') else {
            break;
        };
        let Some((value, after)) = next_value::<Value>(value_text) else {
            break;
        };
        match after.chars().next() {
            Some(',') => {
                members.insert(key, value);
                rest = &after[1..];
            }
            Some('}') => {
                members.insert(key, value);
                break;
            }
            _ => break,
        }
    }
    members
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn object_columns(map: &Map<String, Value>) -> (Vec<ColumnDescriptor>, Vec<Vec<String>>) {
    map.iter()
        .map(|(key, value)| {
            let values: Vec<String> = if value.is_null() { Vec::new() } else { vec![render(value)] };
            let column = ColumnDescriptor::new(key.as_str(), infer_json_type(value))
                .with_nullable(value.is_null())
                .with_samples(values.iter().map(|v| truncate_value(v)));
            (column, values)
        })
        .unzip()
}

/// Columns are the key union of the first items; each is typed from the
/// first item's value.
fn array_columns(items: &[Value]) -> (Vec<ColumnDescriptor>, Vec<Vec<String>>) {
    let objects: Vec<&Map<String, Value>> = items.iter().filter_map(Value::as_object).collect();
    let Some(first) = objects.first() else {
        return (Vec::new(), Vec::new());
    };

    let mut keys: Vec<&String> = Vec::new();
    for object in objects.iter().take(KEY_UNION_ITEMS) {
        for key in object.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    keys.into_iter()
        .map(|key| {
            let first_value = first.get(key);
            let inferred = first_value.map(infer_json_type).unwrap_or(InferredType::Null);
            let samples = objects
                .iter()
                .take(KEY_UNION_ITEMS)
                .filter_map(|object| object.get(key))
                .filter(|value| !value.is_null())
                .map(|value| truncate_value(&render(value)));
            let values: Vec<String> = objects
                .iter()
                .filter_map(|object| object.get(key))
                .filter(|value| !value.is_null())
                .map(render)
                .filter(|value| !value.is_empty())
                .take(MAX_INFERENCE_VALUES)
                .collect();
            let column = ColumnDescriptor::new(key.as_str(), inferred)
                .with_nullable(first_value.map_or(true, Value::is_null))
                .with_samples(samples);
            (column, values)
        })
        .unzip()
}

/// Scalars get a single synthetic `value` column.
fn scalar_columns(items: &[Value]) -> (Vec<ColumnDescriptor>, Vec<Vec<String>>) {
    let Some(first) = items.first() else {
        return (Vec::new(), Vec::new());
    };
    let values: Vec<String> = items
        .iter()
        .filter(|value| !value.is_null())
        .map(render)
        .take(MAX_INFERENCE_VALUES)
        .collect();
    let column = ColumnDescriptor::new("value", infer_json_type(first))
        .with_nullable(false)
        .with_samples(items.iter().take(2).map(|value| truncate_value(&render(value))));
    (vec![column], vec![values])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(extraction: &Extraction) -> Vec<&str> {
        extraction.schema.columns.iter().map(|c| c.name.as_str()).collect()
    }

    fn type_of(extraction: &Extraction, name: &str) -> String {
        extraction.schema.column(name).unwrap().inferred_type.to_string()
    }

    #[test]
    fn single_object_keeps_document_order() {
        let data = br#"{"zeta": 1, "alpha": [[1.5]], "meta": {"a": 1}, "gone": null, "ok": true}"#;
        let extraction = extract(data, false).unwrap();

        assert_eq!(names(&extraction), vec!["zeta", "alpha", "meta", "gone", "ok"]);
        assert_eq!(type_of(&extraction, "zeta"), "int64");
        assert_eq!(type_of(&extraction, "alpha"), "array<array<double>>");
        assert_eq!(type_of(&extraction, "meta"), "object");
        assert_eq!(type_of(&extraction, "gone"), "null");
        assert!(extraction.schema.column("gone").unwrap().nullable);
        assert!(!extraction.schema.column("ok").unwrap().nullable);
        assert_eq!(extraction.schema.column("zeta").unwrap().sample_values, vec!["1"]);
        assert_eq!(extraction.schema.format_specific["structure"], "object");
    }

    #[test]
    fn array_of_objects_unions_first_two_items() {
        let data = br#"[{"id": 1, "email": "a@b.io"}, {"id": 2, "phone": "555-123-4567"}, {"late": 1}]"#;
        let extraction = extract(data, false).unwrap();

        assert_eq!(names(&extraction), vec!["id", "email", "phone"]);
        assert_eq!(type_of(&extraction, "phone"), "null");
        assert!(extraction.schema.column("phone").unwrap().nullable);
        assert_eq!(extraction.schema.column("id").unwrap().sample_values, vec!["1", "2"]);
        assert_eq!(extraction.schema.format_specific["num_items"], 3);
    }

    #[test]
    fn scalar_array_gets_value_column() {
        let extraction = extract(br#"["a", "b", "c"]"#, false).unwrap();
        assert_eq!(names(&extraction), vec!["value"]);
        assert_eq!(type_of(&extraction, "value"), "string");
        assert_eq!(extraction.schema.columns[0].sample_values, vec!["a", "b"]);
        assert_eq!(extraction.values_for(0).len(), 3);
    }

    #[test]
    fn json_lines() {
        let data = b"{\"id\": 1, \"ip\": \"10.0.0.1\"}\n{\"id\": 2, \"ip\": \"10.0.0.2\"}\n{\"id\": 3, \"i";
        let extraction = extract(data, true).unwrap();
        assert_eq!(names(&extraction), vec!["id", "ip"]);
        assert_eq!(extraction.schema.format_specific["structure"], "lines");
        assert_eq!(extraction.values_for(1), ["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
    }

    #[test]
    fn truncated_array_recovers_leading_items() {
        let data = br#"[{"id": 1, "email": "a@b.io"}, {"id": 2, "email": "c@d.io", "extra": 12"#;
        let extraction = extract(data, true).unwrap();
        assert_eq!(names(&extraction), vec!["id", "email"]);
        assert_eq!(extraction.schema.format_specific["num_items"], 1);
        assert_eq!(extraction.schema.format_specific["recovered_from_truncation"], true);
    }

    #[test]
    fn truncated_object_recovers_leading_members() {
        let data = b"{\n  \"id\": 7,\n  \"tags\": [\"a\"],\n  \"count\": 12";
        let extraction = extract(data, true).unwrap();
        // `count` may itself be cut ("12" of "123"), so it is not trusted.
        assert_eq!(names(&extraction), vec!["id", "tags"]);
        assert_eq!(type_of(&extraction, "tags"), "array<string>");
    }

    #[test]
    fn invalid_complete_document_is_an_error() {
        assert!(extract(b"{\"a\": }", false).is_err());
        assert!(extract(b"[{\"a\": 1", true).is_err());
        assert!(extract(b"   ", false).unwrap().schema.is_empty());
    }
}
