//! Parameter schema validation
//!
//! Checks tool arguments against the JSON-Schema subset tool declarations
//! actually use: `type`, `required`, `properties`, `items` and `enum`.
//! Unknown keywords are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// One problem found while validating arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Pointer-like path to the offending value (`/` for the root)
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate `args` against `schema`, collecting every issue
///
/// Arguments are always an object; an empty schema accepts any object.
pub fn validate(schema: &Value, args: &Value) -> Result<(), Vec<ValidationIssue>> {
    debug!("schema::validate: called");
    let mut issues = Vec::new();

    if !args.is_object() {
        issues.push(ValidationIssue::new("/", format!("expected object, got {}", type_name(args))));
        return Err(issues);
    }

    check(schema, args, "", &mut issues);

    if issues.is_empty() {
        Ok(())
    } else {
        debug!(count = issues.len(), "schema::validate: issues found");
        Err(issues)
    }
}

fn check(schema: &Value, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(schema) = schema.as_object() else {
        return;
    };
    let field = if path.is_empty() { "/" } else { path };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(s) => vec![s.as_str()],
            Value::Array(types) => types.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(t, value)) {
            issues.push(ValidationIssue::new(
                field,
                format!("expected {}, got {}", allowed.join(" or "), type_name(value)),
            ));
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum")
        && !options.contains(value)
    {
        issues.push(ValidationIssue::new(field, format!("must be one of {}", Value::Array(options.clone()))));
    }

    if let Value::Object(map) = value {
        check_object(schema, map, path, issues);
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item_schema, item, &format!("{}/{}", path, i), issues);
        }
    }
}

fn check_object(schema: &Map<String, Value>, map: &Map<String, Value>, path: &str, issues: &mut Vec<ValidationIssue>) {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if map.get(name).is_none_or(Value::is_null) {
                issues.push(ValidationIssue::new(format!("{}/{}", path, name), "is required"));
            }
        }
    }

    if let Some(Value::Object(properties)) = schema.get("properties") {
        for (name, prop_schema) in properties {
            // Absent optional properties are fine; a present null is checked
            // only when the property is required (handled above).
            match map.get(name) {
                Some(Value::Null) | None => {}
                Some(v) => check(prop_schema, v, &format!("{}/{}", path, name), issues),
            }
        }
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0),
        // Unknown type keywords accept anything
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Strip keywords that model APIs reject from a server-provided schema
///
/// Removes `$schema` and `additionalProperties` at every depth. A missing or
/// non-object schema becomes an empty object schema.
pub fn sanitize_schema(schema: &Value) -> Value {
    debug!("schema::sanitize_schema: called");
    match schema {
        Value::Object(_) => strip(schema),
        _ => serde_json::json!({"type": "object", "properties": {}}),
    }
}

fn strip(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| k.as_str() != "$schema" && k.as_str() != "additionalProperties")
                .map(|(k, v)| (k.clone(), strip(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip).collect()),
        other => other.clone(),
    }
}
