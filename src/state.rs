//! Local resource state: the host-side configuration store.
//!
//! [`ResourceData`] is the interface the reconciler drives: read desired
//! values, detect which fields changed since they were last applied, write
//! back server-confirmed values, and track the remote identifier.
//! [`ResourceState`] implements it over the JSON documents the provider
//! exchanges with its host.

use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::schema::{Diagnostic, Schema};

/// The attribute that holds the remote identifier in state documents.
pub const ID_ATTRIBUTE: &str = "id";

/// A typed key-value view over one resource instance's configuration and
/// last-applied state.
pub trait ResourceData: Send + Sync {
    /// The desired value of `field`, or `None` when it is unset.
    fn get(&self, field: &str) -> Option<&Value>;

    /// Whether the desired value of `field` differs from the last-applied one.
    fn has_change(&self, field: &str) -> bool;

    /// Record a server-confirmed value for `field`.
    fn set(&mut self, field: &str, value: Value) -> Result<(), ProviderError>;

    /// The remote identifier, empty when the resource has no remote counterpart.
    fn id(&self) -> &str;

    /// Record the remote identifier.
    fn set_id(&mut self, id: &str);

    /// Forget the remote identifier.
    fn clear_id(&mut self) {
        self.set_id("");
    }
}

/// Get a string field, treating unset and non-string values as empty.
pub fn get_str<'a>(data: &'a dyn ResourceData, field: &str) -> &'a str {
    data.get(field).and_then(Value::as_str).unwrap_or_default()
}

/// JSON-backed [`ResourceData`] bound to a resource schema.
///
/// `config` holds the desired values, `state` the values last confirmed by
/// the remote system. Writes go to `state` and are checked against the schema.
#[derive(Debug, Clone)]
pub struct ResourceState<'a> {
    schema: &'a Schema,
    id: String,
    config: Map<String, Value>,
    state: Map<String, Value>,
}

impl<'a> ResourceState<'a> {
    /// An empty state with no identifier.
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            id: String::new(),
            config: Map::new(),
            state: Map::new(),
        }
    }

    /// State for a resource about to be created from `planned`.
    pub fn planned(schema: &'a Schema, planned: &Value) -> Result<Self, ProviderError> {
        let (_, config) = split_document(planned)?;
        Ok(Self {
            config,
            ..Self::new(schema)
        })
    }

    /// State for an existing resource whose desired and applied values are
    /// both `current`.
    pub fn current(schema: &'a Schema, current: &Value) -> Result<Self, ProviderError> {
        let (id, fields) = split_document(current)?;
        Ok(Self {
            schema,
            id,
            config: fields.clone(),
            state: fields,
        })
    }

    /// State for an existing resource moving from `prior` to `planned`.
    pub fn transition(
        schema: &'a Schema,
        prior: &Value,
        planned: &Value,
    ) -> Result<Self, ProviderError> {
        let (id, state) = split_document(prior)?;
        let (_, config) = split_document(planned)?;
        Ok(Self {
            schema,
            id,
            config,
            state,
        })
    }

    /// State that only knows the remote identifier, as used for import.
    pub fn imported(schema: &'a Schema, id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::new(schema)
        }
    }

    /// The last-applied values as a state document, including `id`.
    pub fn to_value(&self) -> Value {
        let mut doc = self.state.clone();
        doc.insert(ID_ATTRIBUTE.to_string(), Value::String(self.id.clone()));
        Value::Object(doc)
    }

    /// The configured values as a state document, including `id`.
    ///
    /// Used when the last-applied values are unknown, e.g. after a create
    /// whose read-back failed.
    pub fn to_desired_value(&self) -> Value {
        let mut doc = self.config.clone();
        doc.insert(ID_ATTRIBUTE.to_string(), Value::String(self.id.clone()));
        Value::Object(doc)
    }
}

impl ResourceData for ResourceState<'_> {
    fn get(&self, field: &str) -> Option<&Value> {
        self.config.get(field).filter(|v| !v.is_null())
    }

    fn has_change(&self, field: &str) -> bool {
        normalized(self.config.get(field)) != normalized(self.state.get(field))
    }

    fn set(&mut self, field: &str, value: Value) -> Result<(), ProviderError> {
        let attr = self.schema.attribute(field).ok_or_else(|| {
            ProviderError::LocalStateWriteFailed(format!("unknown attribute '{}'", field))
        })?;
        if !value.is_null() && !attr.attr_type.matches(&value) {
            return Err(ProviderError::LocalStateWriteFailed(format!(
                "attribute '{}' expects a {} value",
                field,
                attr.attr_type.name()
            )));
        }
        self.state.insert(field.to_string(), value);
        Ok(())
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: &str) {
        self.id = id.to_string();
    }
}

/// Unset, null, empty-string and empty-map values all mean "absent".
fn normalized(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Object(m) => !m.is_empty(),
        _ => true,
    })
}

fn split_document(doc: &Value) -> Result<(String, Map<String, Value>), ProviderError> {
    let mut fields = match doc {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => {
            return Err(ProviderError::Validation(vec![
                Diagnostic::error("Expected object")
                    .with_detail("State documents must be JSON objects"),
            ]))
        },
    };
    let id = match fields.remove(ID_ATTRIBUTE) {
        Some(Value::String(id)) => id,
        _ => String::new(),
    };
    Ok((id, fields))
}
