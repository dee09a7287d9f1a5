//! `opslevel_webhook_action`: a custom actions webhook action.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use super::required_str;
use crate::client::{OpsLevelApi, WebhookAction, WebhookActionCreateInput, WebhookActionUpdateInput};
use crate::error::{ApiError, ProviderError};
use crate::reconciler::{ChangeSet, ResourceKind};
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;
use crate::types::{HttpMethod, Id};

/// Desired state of a webhook action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookActionConfig {
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

/// Field table for webhook actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookActionResource;

fn headers(data: &dyn ResourceData) -> Result<BTreeMap<String, String>, ProviderError> {
    let Some(value) = data.get("headers") else {
        return Ok(BTreeMap::new());
    };
    let map = value
        .as_object()
        .ok_or_else(|| ProviderError::invalid_attribute("headers", "Expected a map of strings"))?;
    map.iter()
        .map(|(name, value)| match value {
            Value::String(s) => Ok((name.clone(), s.clone())),
            _ => Err(ProviderError::invalid_attribute(
                "headers",
                format!("Header '{}' must be a string", name),
            )),
        })
        .collect()
}

#[async_trait]
impl ResourceKind for WebhookActionResource {
    const TYPE_NAME: &'static str = "opslevel_webhook_action";
    const API_NAME: &'static str = "webhook_action";

    type Desired = WebhookActionConfig;
    type Remote = WebhookAction;
    type Create = WebhookActionCreateInput;
    type Update = WebhookActionUpdateInput;

    fn schema(&self, api: &dyn OpsLevelApi) -> Schema {
        Schema::v0()
            .with_description("Manages a webhook action")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("The ID of the webhook action."),
            )
            .with_attribute(
                "name",
                Attribute::required_string().with_description("The name of the external action."),
            )
            .with_attribute(
                "liquid_template",
                Attribute::required_string()
                    .with_description("Template that can be used to generate a Webhook payload."),
            )
            .with_attribute(
                "webhook_url",
                Attribute::required_string().with_description("The URL of the webhook action."),
            )
            .with_attribute(
                "http_method",
                Attribute::required_string()
                    .with_description("The http method used to call the webhook action.")
                    .with_allowed_values(api.http_methods().iter().map(HttpMethod::as_str)),
            )
            .with_attribute(
                "headers",
                Attribute::optional_string_map().with_description(
                    "HTTP headers to be passed along with your Webhook when triggered.",
                ),
            )
    }

    fn desired(&self, data: &dyn ResourceData) -> Result<Self::Desired, ProviderError> {
        let http_method = required_str(data, "http_method")?
            .parse::<HttpMethod>()
            .map_err(|err| ProviderError::invalid_attribute("http_method", err))?;

        Ok(WebhookActionConfig {
            name: required_str(data, "name")?.to_string(),
            liquid_template: required_str(data, "liquid_template")?.to_string(),
            webhook_url: required_str(data, "webhook_url")?.to_string(),
            http_method,
            headers: headers(data)?,
        })
    }

    fn create_input(&self, desired: &Self::Desired) -> Self::Create {
        WebhookActionCreateInput {
            name: desired.name.clone(),
            liquid_template: desired.liquid_template.clone(),
            webhook_url: desired.webhook_url.clone(),
            http_method: desired.http_method,
            headers: desired.headers.clone(),
        }
    }

    fn update_input(&self, id: &Id, desired: &Self::Desired, changes: &ChangeSet) -> Self::Update {
        let mut input = WebhookActionUpdateInput::new(id.clone());
        if changes.contains("name") {
            input.name = Some(desired.name.clone());
        }
        if changes.contains("liquid_template") {
            input.liquid_template = Some(desired.liquid_template.clone());
        }
        if changes.contains("webhook_url") {
            input.webhook_url = Some(desired.webhook_url.clone());
        }
        if changes.contains("http_method") {
            input.http_method = Some(desired.http_method);
        }
        if changes.contains("headers") {
            input.headers = Some(desired.headers.clone());
        }
        input
    }

    fn remote_id(remote: &Self::Remote) -> &Id {
        &remote.id
    }

    fn assume(&self, id: Id, desired: Self::Desired) -> Self::Remote {
        WebhookAction {
            id,
            name: desired.name,
            liquid_template: desired.liquid_template,
            webhook_url: desired.webhook_url,
            http_method: desired.http_method,
            headers: desired.headers,
        }
    }

    fn flatten(&self, remote: &Self::Remote) -> Vec<(&'static str, Value)> {
        let headers = remote
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        vec![
            ("name", Value::String(remote.name.clone())),
            ("liquid_template", Value::String(remote.liquid_template.clone())),
            ("webhook_url", Value::String(remote.webhook_url.clone())),
            ("http_method", Value::String(remote.http_method.to_string())),
            ("headers", Value::Object(headers)),
        ]
    }

    async fn create(
        &self,
        api: &dyn OpsLevelApi,
        input: &Self::Create,
    ) -> Result<Self::Remote, ApiError> {
        api.create_webhook_action(input).await
    }

    async fn get(&self, api: &dyn OpsLevelApi, id: &Id) -> Result<Self::Remote, ApiError> {
        api.get_webhook_action(id).await
    }

    async fn update(
        &self,
        api: &dyn OpsLevelApi,
        input: &Self::Update,
    ) -> Result<Self::Remote, ApiError> {
        api.update_webhook_action(input).await
    }

    async fn delete(&self, api: &dyn OpsLevelApi, id: &Id) -> Result<(), ApiError> {
        api.delete_webhook_action(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ResourceState;
    use crate::testing::FakeOpsLevel;
    use serde_json::json;

    fn config() -> Value {
        json!({
            "name": "page on-call",
            "liquid_template": "{}",
            "webhook_url": "https://hooks.example.com/page",
            "http_method": "PATCH",
            "headers": {"X-Token": "abc", "Accept": "application/json"}
        })
    }

    #[test]
    fn test_schema_allowed_methods_from_client() {
        let schema = WebhookActionResource.schema(&FakeOpsLevel::new());
        assert_eq!(
            schema.attribute("http_method").unwrap().allowed_values,
            Some(vec![
                "DELETE".to_string(),
                "GET".to_string(),
                "PATCH".to_string(),
                "POST".to_string(),
                "PUT".to_string(),
            ])
        );

        let api = FakeOpsLevel::new().with_http_methods(vec![HttpMethod::Get]);
        let schema = WebhookActionResource.schema(&api);
        assert_eq!(
            schema.attribute("http_method").unwrap().allowed_values,
            Some(vec!["GET".to_string()])
        );
    }

    #[test]
    fn test_desired_parses_method_and_headers() {
        let schema = WebhookActionResource.schema(&FakeOpsLevel::new());
        let state = ResourceState::current(&schema, &config()).unwrap();
        let desired = WebhookActionResource.desired(&state).unwrap();
        assert_eq!(desired.http_method, HttpMethod::Patch);
        assert_eq!(desired.headers.len(), 2);
        assert_eq!(desired.headers["X-Token"], "abc");
    }

    #[test]
    fn test_desired_rejects_lowercase_method() {
        let schema = WebhookActionResource.schema(&FakeOpsLevel::new());
        let mut value = config();
        value["http_method"] = json!("post");
        let state = ResourceState::current(&schema, &value).unwrap();
        let err = WebhookActionResource.desired(&state).unwrap_err();
        assert_eq!(err.diagnostics()[0].attribute.as_deref(), Some("http_method"));
    }

    #[test]
    fn test_desired_without_headers() {
        let schema = WebhookActionResource.schema(&FakeOpsLevel::new());
        let mut value = config();
        value.as_object_mut().unwrap().remove("headers");
        let state = ResourceState::current(&schema, &value).unwrap();
        assert!(WebhookActionResource.desired(&state).unwrap().headers.is_empty());
    }

    #[test]
    fn test_update_input_maps_each_field_to_itself() {
        let schema = WebhookActionResource.schema(&FakeOpsLevel::new());
        let state = ResourceState::current(&schema, &config()).unwrap();
        let desired = WebhookActionResource.desired(&state).unwrap();

        let changes: ChangeSet = ["liquid_template", "headers"].into_iter().collect();
        let input = WebhookActionResource.update_input(&Id::new("wa-1"), &desired, &changes);
        assert_eq!(input.liquid_template.as_deref(), Some("{}"));
        assert_eq!(input.webhook_url, None);
        assert_eq!(input.http_method, None);
        assert_eq!(input.headers.as_ref().map(BTreeMap::len), Some(2));
    }

    #[test]
    fn test_flatten_round_trips_through_state() {
        let schema = WebhookActionResource.schema(&FakeOpsLevel::new());
        let state = ResourceState::current(&schema, &config()).unwrap();
        let desired = WebhookActionResource.desired(&state).unwrap();
        let remote = WebhookActionResource.assume(Id::new("wa-1"), desired);

        let mut written = ResourceState::imported(&schema, "wa-1");
        for (field, value) in WebhookActionResource.flatten(&remote) {
            written.set(field, value).unwrap();
        }
        let mut expected = config();
        expected["id"] = json!("wa-1");
        assert_eq!(written.to_value(), expected);
    }
}
