//! Abstraction over the OpsLevel GraphQL API.
//!
//! The provider does not ship a transport. Hosts plug in a client implementing
//! [`OpsLevelApi`]; the request types below serialize with the GraphQL input
//! field names, and update inputs omit every field that is `None` so the API
//! leaves those fields untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::types::{HttpMethod, Id};

/// A custom actions trigger definition as stored by OpsLevel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    /// System-assigned identifier.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// The owning team.
    pub owner: Id,
    /// The action triggered by this definition, if any.
    #[serde(default)]
    pub action: Option<Id>,
}

/// Input for `customActionsTriggerDefinitionCreate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDefinitionCreateInput {
    /// Display name.
    pub name: String,
    /// The owning team.
    #[serde(rename = "ownerId")]
    pub owner: Id,
    /// The action to trigger.
    #[serde(rename = "actionId", skip_serializing_if = "Option::is_none")]
    pub action: Option<Id>,
}

/// Input for `customActionsTriggerDefinitionUpdate`.
///
/// `None` fields are omitted from the request. For `action`, `Some(None)`
/// clears the reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDefinitionUpdateInput {
    /// The trigger definition to update.
    pub id: Id,
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New owning team.
    #[serde(rename = "ownerId", skip_serializing_if = "Option::is_none")]
    pub owner: Option<Id>,
    /// New action reference; `Some(None)` clears it.
    #[serde(rename = "actionId", skip_serializing_if = "Option::is_none")]
    pub action: Option<Option<Id>>,
}

impl TriggerDefinitionUpdateInput {
    /// Start an update that changes nothing.
    pub fn new(id: Id) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// A custom actions webhook action as stored by OpsLevel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAction {
    /// System-assigned identifier.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Liquid template rendered into the webhook payload.
    pub liquid_template: String,
    /// The URL called when the action runs.
    pub webhook_url: String,
    /// The HTTP method used for the call.
    pub http_method: HttpMethod,
    /// Headers sent with the call.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Input for `customActionsWebhookActionCreate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookActionCreateInput {
    /// Display name.
    pub name: String,
    /// Liquid template rendered into the webhook payload.
    pub liquid_template: String,
    /// The URL called when the action runs.
    pub webhook_url: String,
    /// The HTTP method used for the call.
    pub http_method: HttpMethod,
    /// Headers sent with the call.
    pub headers: BTreeMap<String, String>,
}

/// Input for `customActionsWebhookActionUpdate`. `None` fields are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookActionUpdateInput {
    /// The webhook action to update.
    pub id: Id,
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New payload template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquid_template: Option<String>,
    /// New webhook URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// New HTTP method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<HttpMethod>,
    /// Replacement header map; an empty map removes all headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl WebhookActionUpdateInput {
    /// Start an update that changes nothing.
    pub fn new(id: Id) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// Operations the provider needs from the OpsLevel API.
///
/// Implementations must report a missing object as [`ApiError::NotFound`] and
/// classify retryable failures as [`ApiError::Unavailable`] or
/// [`ApiError::Timeout`].
#[async_trait]
pub trait OpsLevelApi: Send + Sync {
    /// The HTTP methods the API accepts for webhook actions.
    fn http_methods(&self) -> Vec<HttpMethod> {
        HttpMethod::ALL.to_vec()
    }

    /// Create a trigger definition.
    async fn create_trigger_definition(
        &self,
        input: &TriggerDefinitionCreateInput,
    ) -> Result<TriggerDefinition, ApiError>;

    /// Fetch a trigger definition.
    async fn get_trigger_definition(&self, id: &Id) -> Result<TriggerDefinition, ApiError>;

    /// Update a trigger definition.
    async fn update_trigger_definition(
        &self,
        input: &TriggerDefinitionUpdateInput,
    ) -> Result<TriggerDefinition, ApiError>;

    /// Delete a trigger definition.
    async fn delete_trigger_definition(&self, id: &Id) -> Result<(), ApiError>;

    /// Create a webhook action.
    async fn create_webhook_action(
        &self,
        input: &WebhookActionCreateInput,
    ) -> Result<WebhookAction, ApiError>;

    /// Fetch a webhook action.
    async fn get_webhook_action(&self, id: &Id) -> Result<WebhookAction, ApiError>;

    /// Update a webhook action.
    async fn update_webhook_action(
        &self,
        input: &WebhookActionUpdateInput,
    ) -> Result<WebhookAction, ApiError>;

    /// Delete a webhook action.
    async fn delete_webhook_action(&self, id: &Id) -> Result<(), ApiError>;
}

/// Type alias to represent a shared API client trait object.
pub type DynApi = Arc<dyn OpsLevelApi>;
