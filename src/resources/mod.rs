//! Resource kinds managed by the provider.
//!
//! Each submodule is a field table for one OpsLevel object type, plugged into
//! the generic [`Reconciler`](crate::reconciler::Reconciler) through
//! [`ResourceKind`](crate::reconciler::ResourceKind).

mod trigger_definition;
mod webhook_action;

pub use trigger_definition::{TriggerDefinitionConfig, TriggerDefinitionResource};
pub use webhook_action::{WebhookActionConfig, WebhookActionResource};

use serde_json::Value;

use crate::error::ProviderError;
use crate::state::{get_str, ResourceData};

/// Get a required string field, rejecting unset and empty values.
pub(crate) fn required_str<'a>(
    data: &'a dyn ResourceData,
    field: &str,
) -> Result<&'a str, ProviderError> {
    match get_str(data, field) {
        "" => Err(ProviderError::invalid_attribute(
            field,
            format!("Missing required attribute '{}'", field),
        )),
        value => Ok(value),
    }
}

/// Encode an optional string as a state value, `null` when unset.
pub(crate) fn nullable(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::String(v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Schema};
    use crate::state::ResourceState;
    use serde_json::json;

    #[test]
    fn test_required_str() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());
        let state = ResourceState::current(&schema, &json!({"name": "deploy"})).unwrap();
        assert_eq!(required_str(&state, "name").unwrap(), "deploy");

        let state = ResourceState::current(&schema, &json!({"name": ""})).unwrap();
        let err = required_str(&state, "name").unwrap_err();
        assert_eq!(err.diagnostics()[0].attribute.as_deref(), Some("name"));
    }

    #[test]
    fn test_nullable() {
        assert_eq!(nullable(None), Value::Null);
        assert_eq!(nullable(Some("wa-1")), json!("wa-1"));
    }
}
