//! Schema validation helpers.
//!
//! Checks a JSON configuration document against a [`Schema`] before any
//! resource-specific rules run.
//!
//! # Example
//!
//! ```
//! use ome_provider::schema::{Attribute, Schema};
//! use ome_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("baseline_name", Attribute::required_string())
//!     .with_attribute("job_retry_count", Attribute::optional_int64());
//!
//! let diagnostics = validate(&schema, &json!({ "baseline_name": "b1", "job_retry_count": 30 }));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({ "baseline_name": "b1", "job_retry_count": "many" }));
//! assert_eq!(diagnostics[0].attribute, Some("job_retry_count".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};
use serde_json::Value;
use std::collections::HashMap;

/// Validate a JSON value against a schema.
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes are skipped
/// - Present values must match the declared type
///
/// An empty result means the value is valid.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return diagnostics,
        other => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(other))),
            );
            return diagnostics;
        },
    };

    for (name, attr) in &schema.block.attributes {
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }

    diagnostics
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_type(attr_type: &AttributeType, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if value.as_i64().is_none() {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) | AttributeType::Set(element_type) => {
            let Some(arr) = value.as_array() else {
                let expected = if attr_type.is_set() { "set" } else { "list" };
                diagnostics.push(type_error(path, expected, value));
                return;
            };
            for (i, elem) in arr.iter().enumerate() {
                validate_type(element_type, elem, &format!("{}.{}", path, i), diagnostics);
            }
        },
        AttributeType::Object(attrs) => match value.as_object() {
            Some(obj) => validate_object(attrs, obj, path, diagnostics),
            None => diagnostics.push(type_error(path, "object", value)),
        },
    }
}

fn validate_object(
    attrs: &HashMap<String, AttributeType>,
    obj: &serde_json::Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, attr_type) in attrs {
        if let Some(value) = obj.get(name).filter(|v| !v.is_null()) {
            validate_type(attr_type, value, &format!("{}.{}", path, name), diagnostics);
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeFlags, Schema};
    use serde_json::json;

    fn baseline_like() -> Schema {
        Schema::v0()
            .with_attribute("baseline_name", Attribute::required_string())
            .with_attribute("id", Attribute::computed_int64())
            .with_attribute(
                "device_ids",
                Attribute::new(
                    AttributeType::set(AttributeType::Int64),
                    AttributeFlags::optional(),
                ),
            )
            .with_attribute("schedule", Attribute::optional_bool())
    }

    #[test]
    fn test_valid_document() {
        let diagnostics = validate(
            &baseline_like(),
            &json!({"baseline_name": "b1", "device_ids": [10, 20], "schedule": false}),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_missing_required() {
        let diagnostics = validate(&baseline_like(), &json!({"schedule": true}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("baseline_name".to_string()));
        assert!(diagnostics[0].summary.contains("Missing required"));
    }

    #[test]
    fn test_computed_only_is_skipped() {
        let diagnostics = validate(&baseline_like(), &json!({"baseline_name": "b1", "id": "abc"}));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_set_element_type() {
        let diagnostics = validate(
            &baseline_like(),
            &json!({"baseline_name": "b1", "device_ids": [10, "SVC1"]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("device_ids.1".to_string()));
    }

    #[test]
    fn test_set_requires_array() {
        let diagnostics = validate(
            &baseline_like(),
            &json!({"baseline_name": "b1", "device_ids": 10}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].detail, Some("Expected set, got number".to_string()));
    }

    #[test]
    fn test_object_elements() {
        let schema = Schema::v0().with_attribute(
            "rows",
            Attribute::new(
                AttributeType::list(AttributeType::object([("device_id", AttributeType::Int64)])),
                AttributeFlags::optional(),
            ),
        );
        let diagnostics = validate(&schema, &json!({"rows": [{"device_id": "x"}]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("rows.0.device_id".to_string()));
    }

    #[test]
    fn test_non_object_root() {
        let diagnostics = validate(&baseline_like(), &json!([1, 2]));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Expected object");
    }
}
