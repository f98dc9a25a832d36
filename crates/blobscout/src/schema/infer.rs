//! Majority-vote typing of text columns.

use blobscout_protocol::InferredType;
use serde_json::Value;

/// At most this many non-empty values are inspected per column.
pub const MAX_INFERENCE_VALUES: usize = 100;

/// Type checks in priority order. The first one satisfied by at least 80%
/// of the inspected values wins; `"1"` counts for int, float and bool alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCheck {
    Int,
    Float,
    Bool,
    Date,
}

impl TypeCheck {
    const PRIORITY: [TypeCheck; 4] = [TypeCheck::Int, TypeCheck::Float, TypeCheck::Bool, TypeCheck::Date];

    fn matches(self, value: &str) -> bool {
        match self {
            TypeCheck::Int => value.parse::<i64>().is_ok(),
            TypeCheck::Float => value.parse::<f64>().is_ok(),
            TypeCheck::Bool => matches!(
                value.to_ascii_lowercase().as_str(),
                "true" | "false" | "yes" | "no" | "1" | "0"
            ),
            TypeCheck::Date => is_date_like(value),
        }
    }

    fn inferred(self) -> InferredType {
        match self {
            TypeCheck::Int => InferredType::Int64,
            TypeCheck::Float => InferredType::Double,
            TypeCheck::Bool => InferredType::Bool,
            TypeCheck::Date => InferredType::Date,
        }
    }
}

/// Three integers separated by `/` or `-`, like `2024-01-31` or `1/31/2024`.
fn is_date_like(value: &str) -> bool {
    if !value.contains('/') && !value.contains('-') {
        return false;
    }
    let normalized = value.replace('/', "-");
    let parts: Vec<&str> = normalized.split('-').collect();
    parts.len() == 3 && parts.iter().all(|part| part.parse::<i64>().is_ok())
}

/// Infer a column type from its textual values.
///
/// Empty and whitespace-only values are ignored; a column with nothing
/// left is `string`.
pub fn infer_text_type<S: AsRef<str>>(values: &[S]) -> InferredType {
    let inspected: Vec<&str> = values
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .take(MAX_INFERENCE_VALUES)
        .collect();
    if inspected.is_empty() {
        return InferredType::String;
    }

    let total = inspected.len();
    for check in TypeCheck::PRIORITY {
        let hits = inspected.iter().filter(|v| check.matches(v)).count();
        if hits * 5 >= total * 4 {
            return check.inferred();
        }
    }
    InferredType::String
}

/// Type of a JSON value; arrays are typed from their first element.
pub fn infer_json_type(value: &Value) -> InferredType {
    match value {
        Value::Null => InferredType::Null,
        Value::Bool(_) => InferredType::Bool,
        Value::Number(n) if n.is_i64() || n.is_u64() => InferredType::Int64,
        Value::Number(_) => InferredType::Double,
        Value::String(_) => InferredType::String,
        Value::Array(items) => match items.first() {
            Some(first) => InferredType::array_of(infer_json_type(first)),
            None => InferredType::Array(None),
        },
        Value::Object(_) => InferredType::Object,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn threshold_boundary() {
        assert_eq!(infer_text_type(&["1", "2", "3", "x"]), InferredType::String);
        assert_eq!(infer_text_type(&["1", "2", "3", "4"]), InferredType::Int64);
        assert_eq!(infer_text_type(&["1", "2", "3", "4", "x"]), InferredType::Int64);
    }

    #[test]
    fn priority_order() {
        // Every value is int- and bool-like: int wins.
        assert_eq!(infer_text_type(&["1", "0", "1", "0"]), InferredType::Int64);
        assert_eq!(infer_text_type(&["1.5", "2", "3.25", "4"]), InferredType::Double);
        assert_eq!(infer_text_type(&["yes", "no", "TRUE", "0"]), InferredType::Bool);
        assert_eq!(
            infer_text_type(&["2024-01-31", "1/2/2023", "2023-12-01", "n/a"]),
            InferredType::String
        );
        assert_eq!(
            infer_text_type(&["2024-01-31", "1/2/2023", "2023-12-01", "2020-02-02", "n/a"]),
            InferredType::Date
        );
    }

    #[test]
    fn blanks_are_ignored() {
        assert_eq!(infer_text_type(&["", "  ", "7"]), InferredType::Int64);
        assert_eq!(infer_text_type::<&str>(&[]), InferredType::String);
        assert_eq!(infer_text_type(&["", " "]), InferredType::String);
    }

    #[test]
    fn only_the_first_hundred_values_count() {
        let mut values: Vec<String> = (0..100).map(|i| i.to_string()).collect();
        values.extend((0..200).map(|_| "text".to_string()));
        assert_eq!(infer_text_type(&values), InferredType::Int64);
    }

    #[test]
    fn json_types() {
        assert_eq!(infer_json_type(&json!(null)), InferredType::Null);
        assert_eq!(infer_json_type(&json!(true)), InferredType::Bool);
        assert_eq!(infer_json_type(&json!(3)), InferredType::Int64);
        assert_eq!(infer_json_type(&json!(3.5)), InferredType::Double);
        assert_eq!(infer_json_type(&json!({"a": 1})), InferredType::Object);
        assert_eq!(infer_json_type(&json!([])), InferredType::Array(None));
        assert_eq!(
            infer_json_type(&json!([["a"], ["b"]])),
            InferredType::array_of(InferredType::array_of(InferredType::String))
        );
    }
}
