//! Configuration validation against a resource [`Schema`].
//!
//! Resource schemas are flat, so validation is a single pass over the
//! attribute table: required attributes must be present and non-empty, values
//! must have the declared type, enumerated attributes must use one of their
//! allowed values, and unknown attributes are rejected.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_opslevel::schema::{Attribute, Schema};
//! use hemmer_provider_opslevel::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("owner", Attribute::required_string());
//!
//! let diagnostics = validate(&schema, &json!({"name": "deploy", "owner": "acct-1"}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "deploy"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("owner".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};
use serde_json::Value;

/// Validate a JSON configuration object against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        },
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(name, attr, obj.get(name), &mut diagnostics);
    }

    for name in obj.keys() {
        if schema.attribute(name).is_none() {
            diagnostics.push(
                Diagnostic::error(format!("Unsupported attribute '{}'", name))
                    .with_detail("This attribute is not declared by the resource schema")
                    .with_attribute(name.as_str()),
            );
        }
    }

    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
///
/// This is a convenience wrapper around [`validate`] that returns a Result.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attribute(
    name: &str,
    attr: &Attribute,
    value: Option<&Value>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Computed-only attributes are set by the provider.
    if !attr.flags.is_configurable() {
        return;
    }

    let value = match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", name))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(name),
                );
            }
            return;
        },
        Some(v) => v,
    };

    if !attr.attr_type.matches(value) {
        diagnostics.push(type_error(name, &attr.attr_type, value));
        return;
    }

    if let Value::String(s) = value {
        if attr.flags.required && s.is_empty() {
            diagnostics.push(
                Diagnostic::error(format!("Attribute '{}' must not be empty", name))
                    .with_attribute(name),
            );
            return;
        }
        if let Some(allowed) = &attr.allowed_values {
            if !allowed.iter().any(|a| a == s) {
                diagnostics.push(
                    Diagnostic::error(format!("Invalid value '{}' for attribute '{}'", s, name))
                        .with_detail(format!("Expected one of: {}", allowed.join(", ")))
                        .with_attribute(name),
                );
            }
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

fn type_error(name: &str, expected: &AttributeType, got: &Value) -> Diagnostic {
    let detail = match (expected, got) {
        (AttributeType::Map(element_type), Value::Object(_)) => {
            format!("Expected map of {} values", element_type.name())
        },
        _ => format!("Expected {}, got {}", expected.name(), value_type_name(got)),
    };
    Diagnostic::error(format!("Invalid type for attribute '{}'", name))
        .with_detail(detail)
        .with_attribute(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    fn webhook_like() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "http_method",
                Attribute::required_string().with_allowed_values(["GET", "POST"]),
            )
            .with_attribute("headers", Attribute::optional_string_map())
    }

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "deploy"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        let diagnostics = validate(&schema, &json!({"name": null}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(&schema, &json!({"name": ""}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("must not be empty"));

        let diagnostics = validate(&schema, &json!({"name": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_optional_attribute() {
        let schema = Schema::v0().with_attribute("action_id", Attribute::optional_string());

        assert!(validate(&schema, &json!({"action_id": "act-1"})).is_empty());
        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"action_id": null})).is_empty());
        assert!(validate(&schema, &json!({"action_id": ""})).is_empty());
        assert_eq!(validate(&schema, &json!({"action_id": 7})).len(), 1);
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = webhook_like();
        let diagnostics = validate(&schema, &json!({"id": 42, "name": "a", "http_method": "GET"}));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_validate_allowed_values() {
        let schema = webhook_like();

        let diagnostics = validate(&schema, &json!({"name": "a", "http_method": "FETCH"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("http_method".to_string()));
        assert_eq!(
            diagnostics[0].detail,
            Some("Expected one of: GET, POST".to_string())
        );

        // Matching is case-sensitive.
        assert!(!is_valid(&schema, &json!({"name": "a", "http_method": "post"})));
    }

    #[test]
    fn test_validate_map() {
        let schema = webhook_like();

        assert!(is_valid(
            &schema,
            &json!({"name": "a", "http_method": "POST", "headers": {"Accept": "application/json"}})
        ));

        let diagnostics = validate(
            &schema,
            &json!({"name": "a", "http_method": "POST", "headers": {"X-Retries": 3}}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].detail,
            Some("Expected map of string values".to_string())
        );
    }

    #[test]
    fn test_validate_unknown_attribute() {
        let schema = webhook_like();
        let diagnostics = validate(
            &schema,
            &json!({"name": "a", "http_method": "POST", "timeout": "5s"}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("timeout".to_string()));
    }

    #[test]
    fn test_validate_multiple_errors() {
        let schema = webhook_like();
        let diagnostics = validate(&schema, &json!({"http_method": 1, "headers": "x"}));
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn test_validate_result_helper() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate_result(&schema, &json!({"name": "test"})).is_ok());

        let result = validate_result(&schema, &json!({}));
        assert_eq!(result.unwrap_err().len(), 1);
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
    }
}
