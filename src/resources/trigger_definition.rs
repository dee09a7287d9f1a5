//! `opslevel_trigger_definition`: a custom actions trigger definition.

use async_trait::async_trait;
use serde_json::Value;

use super::{nullable, required_str};
use crate::client::{
    OpsLevelApi, TriggerDefinition, TriggerDefinitionCreateInput, TriggerDefinitionUpdateInput,
};
use crate::error::{ApiError, ProviderError};
use crate::reconciler::{ChangeSet, ResourceKind};
use crate::schema::{Attribute, Schema};
use crate::state::{get_str, ResourceData};
use crate::types::Id;

/// Desired state of a trigger definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDefinitionConfig {
    /// Display name.
    pub name: String,
    /// The owning team.
    pub owner: Id,
    /// The action to trigger; `None` leaves the definition without one.
    pub action: Option<Id>,
}

/// Field table for trigger definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerDefinitionResource;

#[async_trait]
impl ResourceKind for TriggerDefinitionResource {
    const TYPE_NAME: &'static str = "opslevel_trigger_definition";
    const API_NAME: &'static str = "trigger_definition";

    type Desired = TriggerDefinitionConfig;
    type Remote = TriggerDefinition;
    type Create = TriggerDefinitionCreateInput;
    type Update = TriggerDefinitionUpdateInput;

    fn schema(&self, _api: &dyn OpsLevelApi) -> Schema {
        Schema::v0()
            .with_description("Manages a custom actions trigger definition")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("The ID of the Trigger Definition"),
            )
            .with_attribute(
                "name",
                Attribute::required_string().with_description("The name of the Trigger Definition"),
            )
            .with_attribute(
                "owner",
                Attribute::required_string()
                    .with_description("The owner of the Trigger Definition"),
            )
            .with_attribute(
                "action_id",
                Attribute::optional_string().with_description(
                    "The action that will be triggered by the Trigger Definition",
                ),
            )
    }

    fn desired(&self, data: &dyn ResourceData) -> Result<Self::Desired, ProviderError> {
        Ok(TriggerDefinitionConfig {
            name: required_str(data, "name")?.to_string(),
            owner: Id::new(required_str(data, "owner")?),
            action: Id::optional(get_str(data, "action_id")),
        })
    }

    fn create_input(&self, desired: &Self::Desired) -> Self::Create {
        TriggerDefinitionCreateInput {
            name: desired.name.clone(),
            owner: desired.owner.clone(),
            action: desired.action.clone(),
        }
    }

    fn update_input(&self, id: &Id, desired: &Self::Desired, changes: &ChangeSet) -> Self::Update {
        let mut input = TriggerDefinitionUpdateInput::new(id.clone());
        if changes.contains("name") {
            input.name = Some(desired.name.clone());
        }
        if changes.contains("owner") {
            input.owner = Some(desired.owner.clone());
        }
        if changes.contains("action_id") {
            input.action = Some(desired.action.clone());
        }
        input
    }

    fn remote_id(remote: &Self::Remote) -> &Id {
        &remote.id
    }

    fn assume(&self, id: Id, desired: Self::Desired) -> Self::Remote {
        TriggerDefinition {
            id,
            name: desired.name,
            owner: desired.owner,
            action: desired.action,
        }
    }

    fn flatten(&self, remote: &Self::Remote) -> Vec<(&'static str, Value)> {
        vec![
            ("name", Value::String(remote.name.clone())),
            ("owner", Value::String(remote.owner.to_string())),
            ("action_id", nullable(remote.action.as_ref().map(Id::as_str))),
        ]
    }

    async fn create(
        &self,
        api: &dyn OpsLevelApi,
        input: &Self::Create,
    ) -> Result<Self::Remote, ApiError> {
        api.create_trigger_definition(input).await
    }

    async fn get(&self, api: &dyn OpsLevelApi, id: &Id) -> Result<Self::Remote, ApiError> {
        api.get_trigger_definition(id).await
    }

    async fn update(
        &self,
        api: &dyn OpsLevelApi,
        input: &Self::Update,
    ) -> Result<Self::Remote, ApiError> {
        api.update_trigger_definition(input).await
    }

    async fn delete(&self, api: &dyn OpsLevelApi, id: &Id) -> Result<(), ApiError> {
        api.delete_trigger_definition(id).await
    }
}
