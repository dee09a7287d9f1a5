//! The provider surface: routes JSON state documents to resource handlers.
//!
//! The host exchanges resource state as JSON objects keyed by attribute name,
//! with the remote identifier under `id`. [`OpsLevelProvider`] looks up the
//! handler for a resource type, wraps the documents in a
//! [`ResourceState`](crate::state::ResourceState) and runs the matching
//! reconciler operation. It also computes plans and performs imports.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::client::DynApi;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::reconciler::{ReconcileOptions, Reconciler, ResourceKind};
use crate::resources::{TriggerDefinitionResource, WebhookActionResource};
use crate::schema::{Diagnostic, ProviderSchema, Schema};
use crate::state::{ResourceData, ResourceState, ID_ATTRIBUTE};
use crate::types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
use crate::validation::validate;

/// A resource type handler working on JSON state documents.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// The resource type name.
    fn type_name(&self) -> &'static str;

    /// The resource schema.
    fn schema(&self) -> &Schema;

    /// Create the resource and return its new state.
    ///
    /// If the object was created but could not be confirmed, the error is
    /// [`ProviderError::IncompleteCreate`] carrying the identifier.
    async fn create_state(&self, planned: &Value) -> Result<Value, ProviderError>;

    /// Refresh the state, `None` when the resource is gone.
    async fn read_state(&self, current: &Value) -> Result<Option<Value>, ProviderError>;

    /// Move the resource from `prior` to `planned` and return its new state.
    async fn update_state(&self, prior: &Value, planned: &Value) -> Result<Value, ProviderError>;

    /// Delete the resource.
    async fn delete_state(&self, current: &Value) -> Result<(), ProviderError>;

    /// Adopt an existing remote object by identifier and return its state.
    async fn import_state(&self, id: &str) -> Result<Value, ProviderError>;
}

#[async_trait]
impl<K: ResourceKind> ResourceHandler for Reconciler<K> {
    fn type_name(&self) -> &'static str {
        K::TYPE_NAME
    }

    fn schema(&self) -> &Schema {
        Reconciler::schema(self)
    }

    async fn create_state(&self, planned: &Value) -> Result<Value, ProviderError> {
        let mut state = ResourceState::planned(Reconciler::schema(self), planned)?;
        match self.create(&mut state).await {
            Ok(_) => Ok(state.to_value()),
            Err(err) if !state.id().is_empty() => Err(ProviderError::IncompleteCreate {
                state: state.to_desired_value(),
                source: Box::new(err),
            }),
            Err(err) => Err(err),
        }
    }

    async fn read_state(&self, current: &Value) -> Result<Option<Value>, ProviderError> {
        let mut state = ResourceState::current(Reconciler::schema(self), current)?;
        Ok(self.read(&mut state).await?.map(|_| state.to_value()))
    }

    async fn update_state(&self, prior: &Value, planned: &Value) -> Result<Value, ProviderError> {
        let mut state = ResourceState::transition(Reconciler::schema(self), prior, planned)?;
        self.update(&mut state).await?;
        Ok(state.to_value())
    }

    async fn delete_state(&self, current: &Value) -> Result<(), ProviderError> {
        let mut state = ResourceState::current(Reconciler::schema(self), current)?;
        self.delete(&mut state).await
    }

    async fn import_state(&self, id: &str) -> Result<Value, ProviderError> {
        if id.is_empty() {
            return Err(ProviderError::FailedPrecondition(
                "import requires a resource identifier".to_string(),
            ));
        }
        let mut state = ResourceState::imported(Reconciler::schema(self), id);
        match self.read(&mut state).await? {
            Some(_) => Ok(state.to_value()),
            None => Err(ProviderError::ResourceGone(id.to_string())),
        }
    }
}

/// The OpsLevel provider: trigger definitions and webhook actions.
pub struct OpsLevelProvider {
    handlers: BTreeMap<&'static str, Box<dyn ResourceHandler>>,
}

impl OpsLevelProvider {
    /// Create a provider with default timeouts and retries.
    pub fn new(api: DynApi) -> Self {
        Self::with_options(api, ReconcileOptions::default())
    }

    /// Create a provider with explicit timeout and retry settings.
    pub fn with_options(api: DynApi, options: ReconcileOptions) -> Self {
        let handlers: Vec<Box<dyn ResourceHandler>> = vec![
            Box::new(Reconciler::new(
                TriggerDefinitionResource,
                api.clone(),
                options.clone(),
            )),
            Box::new(Reconciler::new(WebhookActionResource, api, options)),
        ];
        Self {
            handlers: handlers.into_iter().map(|h| (h.type_name(), h)).collect(),
        }
    }

    /// Create a provider from its configuration block.
    pub fn from_config(api: DynApi, config: &ProviderConfig) -> Self {
        Self::with_options(api, config.reconcile_options())
    }

    fn handler(&self, resource_type: &str) -> Result<&dyn ResourceHandler, ProviderError> {
        self.handlers
            .get(resource_type)
            .map(|h| h.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    /// The provider configuration schema and every resource schema.
    pub fn schema(&self) -> ProviderSchema {
        self.handlers.values().fold(
            ProviderSchema::new().with_provider_config(ProviderConfig::schema()),
            |schema, h| schema.with_resource(h.type_name(), h.schema().clone()),
        )
    }

    /// The resource type names.
    pub fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.handlers.keys().map(|name| name.to_string()).collect(),
        }
    }

    /// Validate a resource configuration without contacting the API.
    pub fn validate_resource_config(
        &self,
        resource_type: &str,
        config: &Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(self.handler(resource_type)?.schema(), config))
    }

    /// Compute the changes needed to move from `prior` to `proposed`.
    ///
    /// `prior` is `None` for a resource that does not exist yet; a `null`
    /// `proposed` plans a deletion. The planned state carries the prior `id`.
    #[instrument(skip(self, prior, proposed))]
    pub fn plan(
        &self,
        resource_type: &str,
        prior: Option<&Value>,
        proposed: &Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.handler(resource_type)?.schema();

        if proposed.is_null() {
            let changes: Vec<AttributeChange> = prior
                .and_then(Value::as_object)
                .map(|prior| {
                    schema
                        .configurable()
                        .filter_map(|name| {
                            present(prior.get(name))
                                .map(|v| AttributeChange::removed(name, v.clone()))
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Ok(PlanResult::with_changes(Value::Null, changes, false));
        }

        let diagnostics = validate(schema, proposed);
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Err(ProviderError::Validation(diagnostics));
        }

        let state = match prior {
            Some(prior) => ResourceState::transition(schema, prior, proposed)?,
            None => ResourceState::planned(schema, proposed)?,
        };

        // Every attribute is updatable in place, so no plan requires replacement.
        let changes: Vec<AttributeChange> = schema
            .configurable()
            .filter(|name| state.has_change(name))
            .map(|name| {
                let before = prior.and_then(|p| present(p.get(name))).cloned();
                let after = present(proposed.get(name)).cloned();
                AttributeChange::new(name, before, after)
            })
            .collect();

        let mut planned: Map<String, Value> = proposed.as_object().cloned().unwrap_or_default();
        planned.remove(ID_ATTRIBUTE);
        if !state.id().is_empty() {
            planned.insert(ID_ATTRIBUTE.to_string(), Value::String(state.id().to_string()));
        }
        let planned = Value::Object(planned);

        debug!(changes = changes.len(), "Planned resource");
        if changes.is_empty() {
            Ok(PlanResult::no_change(planned))
        } else {
            Ok(PlanResult::with_changes(planned, changes, false))
        }
    }

    /// Create a resource from its planned state.
    #[instrument(skip(self, planned))]
    pub async fn create(
        &self,
        resource_type: &str,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.handler(resource_type)?.create_state(&planned).await
    }

    /// Refresh a resource; `None` means it no longer exists.
    #[instrument(skip(self, current))]
    pub async fn read(
        &self,
        resource_type: &str,
        current: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.handler(resource_type)?.read_state(&current).await
    }

    /// Update a resource from `prior` to `planned`.
    #[instrument(skip(self, prior, planned))]
    pub async fn update(
        &self,
        resource_type: &str,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.handler(resource_type)?
            .update_state(&prior, &planned)
            .await
    }

    /// Delete a resource.
    #[instrument(skip(self, current))]
    pub async fn delete(&self, resource_type: &str, current: Value) -> Result<(), ProviderError> {
        self.handler(resource_type)?.delete_state(&current).await
    }

    /// Import an existing remote object by identifier.
    ///
    /// The identifier is adopted as is and a read fills in every other field.
    /// A missing object is reported as [`ProviderError::ResourceGone`].
    #[instrument(skip(self))]
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<ImportedResource, ProviderError> {
        let state = self.handler(resource_type)?.import_state(id).await?;
        info!("Imported resource");
        Ok(ImportedResource::new(resource_type, state))
    }
}

/// A value that counts as set: not missing and not `null`.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}
