//! Testing utilities for the OpsLevel provider.
//!
//! [`FakeOpsLevel`] is an in-memory [`OpsLevelApi`] that records every call
//! and can be told to fail the next calls, so reconciliation can be exercised
//! without a network. [`ProviderTester`] wraps an [`OpsLevelProvider`] backed
//! by a fake and adds lifecycle helpers.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_opslevel::testing::ProviderTester;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let tester = ProviderTester::new();
//! let state = tester
//!     .lifecycle_create("opslevel_trigger_definition", json!({
//!         "name": "deploy",
//!         "owner": "team-1"
//!     }))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(state["name"], "deploy");
//! assert_eq!(tester.api().call_count(), 2);
//! # });
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{
    OpsLevelApi, TriggerDefinition, TriggerDefinitionCreateInput, TriggerDefinitionUpdateInput,
    WebhookAction, WebhookActionCreateInput, WebhookActionUpdateInput,
};
use crate::error::{ApiError, ProviderError};
use crate::provider::OpsLevelProvider;
use crate::reconciler::ReconcileOptions;
use crate::retry::RetryPolicy;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{HttpMethod, Id, ImportedResource, PlanResult};

/// A request received by [`FakeOpsLevel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `create_trigger_definition`
    CreateTriggerDefinition(TriggerDefinitionCreateInput),
    /// `get_trigger_definition`
    GetTriggerDefinition(Id),
    /// `update_trigger_definition`
    UpdateTriggerDefinition(TriggerDefinitionUpdateInput),
    /// `delete_trigger_definition`
    DeleteTriggerDefinition(Id),
    /// `create_webhook_action`
    CreateWebhookAction(WebhookActionCreateInput),
    /// `get_webhook_action`
    GetWebhookAction(Id),
    /// `update_webhook_action`
    UpdateWebhookAction(WebhookActionUpdateInput),
    /// `delete_webhook_action`
    DeleteWebhookAction(Id),
}

#[derive(Debug, Default)]
struct Inner {
    trigger_definitions: BTreeMap<Id, TriggerDefinition>,
    webhook_actions: BTreeMap<Id, WebhookAction>,
    calls: Vec<Call>,
    failures: VecDeque<ApiError>,
    read_failure: Option<ApiError>,
    next_id: u64,
}

impl Inner {
    /// Record `call` and pop the next injected failure, if any.
    fn begin(&mut self, call: Call) -> Result<(), ApiError> {
        let read = matches!(call, Call::GetTriggerDefinition(_) | Call::GetWebhookAction(_));
        self.calls.push(call);
        if let Some(err) = self.read_failure.as_ref().filter(|_| read) {
            return Err(err.clone());
        }
        match self.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn allocate(&mut self, prefix: &str) -> Id {
        self.next_id += 1;
        Id::new(format!("{}-{}", prefix, self.next_id))
    }
}

fn not_found(kind: &str, id: &Id) -> ApiError {
    ApiError::NotFound(format!("{} '{}'", kind, id))
}

/// An in-memory OpsLevel API.
///
/// Created objects get identifiers `td-N` and `wa-N`. Failures queued with
/// [`FakeOpsLevel::fail_next`] are returned by the next calls in order, one
/// per call, after the call has been recorded. [`FakeOpsLevel::fail_reads`]
/// fails every `get_*` call until [`FakeOpsLevel::restore_reads`].
#[derive(Debug)]
pub struct FakeOpsLevel {
    inner: Mutex<Inner>,
    http_methods: Vec<HttpMethod>,
}

impl Default for FakeOpsLevel {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeOpsLevel {
    /// An empty fake accepting every HTTP method.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            http_methods: HttpMethod::ALL.to_vec(),
        }
    }

    /// Restrict the HTTP methods reported by [`OpsLevelApi::http_methods`].
    pub fn with_http_methods(mut self, methods: Vec<HttpMethod>) -> Self {
        self.http_methods = methods;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next call with `err`. Repeated calls queue further failures.
    pub fn fail_next(&self, err: ApiError) {
        self.lock().failures.push_back(err);
    }

    /// Fail every read with `err` while writes keep succeeding.
    pub fn fail_reads(&self, err: ApiError) {
        self.lock().read_failure = Some(err);
    }

    /// Stop failing reads.
    pub fn restore_reads(&self) {
        self.lock().read_failure = None;
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// The stored trigger definition with `id`.
    pub fn trigger_definition(&self, id: &str) -> Option<TriggerDefinition> {
        self.lock().trigger_definitions.get(&Id::new(id)).cloned()
    }

    /// The stored webhook action with `id`.
    pub fn webhook_action(&self, id: &str) -> Option<WebhookAction> {
        self.lock().webhook_actions.get(&Id::new(id)).cloned()
    }

    /// Store a trigger definition as if created out of band.
    pub fn insert_trigger_definition(&self, definition: TriggerDefinition) {
        self.lock()
            .trigger_definitions
            .insert(definition.id.clone(), definition);
    }

    /// Store a webhook action as if created out of band.
    pub fn insert_webhook_action(&self, action: WebhookAction) {
        self.lock().webhook_actions.insert(action.id.clone(), action);
    }

    /// Delete an object out of band, simulating drift.
    pub fn remove(&self, id: &str) {
        let id = Id::new(id);
        let mut inner = self.lock();
        inner.trigger_definitions.remove(&id);
        inner.webhook_actions.remove(&id);
    }
}

#[async_trait]
impl OpsLevelApi for FakeOpsLevel {
    fn http_methods(&self) -> Vec<HttpMethod> {
        self.http_methods.clone()
    }

    async fn create_trigger_definition(
        &self,
        input: &TriggerDefinitionCreateInput,
    ) -> Result<TriggerDefinition, ApiError> {
        let mut inner = self.lock();
        inner.begin(Call::CreateTriggerDefinition(input.clone()))?;
        let definition = TriggerDefinition {
            id: inner.allocate("td"),
            name: input.name.clone(),
            owner: input.owner.clone(),
            action: input.action.clone(),
        };
        inner
            .trigger_definitions
            .insert(definition.id.clone(), definition.clone());
        Ok(definition)
    }

    async fn get_trigger_definition(&self, id: &Id) -> Result<TriggerDefinition, ApiError> {
        let mut inner = self.lock();
        inner.begin(Call::GetTriggerDefinition(id.clone()))?;
        inner
            .trigger_definitions
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("trigger definition", id))
    }

    async fn update_trigger_definition(
        &self,
        input: &TriggerDefinitionUpdateInput,
    ) -> Result<TriggerDefinition, ApiError> {
        let mut inner = self.lock();
        inner.begin(Call::UpdateTriggerDefinition(input.clone()))?;
        let definition = inner
            .trigger_definitions
            .get_mut(&input.id)
            .ok_or_else(|| not_found("trigger definition", &input.id))?;
        if let Some(name) = &input.name {
            definition.name = name.clone();
        }
        if let Some(owner) = &input.owner {
            definition.owner = owner.clone();
        }
        if let Some(action) = &input.action {
            definition.action = action.clone();
        }
        Ok(definition.clone())
    }

    async fn delete_trigger_definition(&self, id: &Id) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.begin(Call::DeleteTriggerDefinition(id.clone()))?;
        inner
            .trigger_definitions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("trigger definition", id))
    }

    async fn create_webhook_action(
        &self,
        input: &WebhookActionCreateInput,
    ) -> Result<WebhookAction, ApiError> {
        let mut inner = self.lock();
        inner.begin(Call::CreateWebhookAction(input.clone()))?;
        let action = WebhookAction {
            id: inner.allocate("wa"),
            name: input.name.clone(),
            liquid_template: input.liquid_template.clone(),
            webhook_url: input.webhook_url.clone(),
            http_method: input.http_method,
            headers: input.headers.clone(),
        };
        inner.webhook_actions.insert(action.id.clone(), action.clone());
        Ok(action)
    }

    async fn get_webhook_action(&self, id: &Id) -> Result<WebhookAction, ApiError> {
        let mut inner = self.lock();
        inner.begin(Call::GetWebhookAction(id.clone()))?;
        inner
            .webhook_actions
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("webhook action", id))
    }

    async fn update_webhook_action(
        &self,
        input: &WebhookActionUpdateInput,
    ) -> Result<WebhookAction, ApiError> {
        let mut inner = self.lock();
        inner.begin(Call::UpdateWebhookAction(input.clone()))?;
        let action = inner
            .webhook_actions
            .get_mut(&input.id)
            .ok_or_else(|| not_found("webhook action", &input.id))?;
        if let Some(name) = &input.name {
            action.name = name.clone();
        }
        if let Some(template) = &input.liquid_template {
            action.liquid_template = template.clone();
        }
        if let Some(url) = &input.webhook_url {
            action.webhook_url = url.clone();
        }
        if let Some(method) = input.http_method {
            action.http_method = method;
        }
        if let Some(headers) = &input.headers {
            action.headers = headers.clone();
        }
        Ok(action.clone())
    }

    async fn delete_webhook_action(&self, id: &Id) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.begin(Call::DeleteWebhookAction(id.clone()))?;
        inner
            .webhook_actions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("webhook action", id))
    }
}

/// A test harness around an [`OpsLevelProvider`] backed by a [`FakeOpsLevel`].
///
/// Retries use millisecond delays so failure-injection tests stay fast.
pub struct ProviderTester {
    api: Arc<FakeOpsLevel>,
    provider: OpsLevelProvider,
}

impl Default for ProviderTester {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderTester {
    /// Create a tester with an empty fake API.
    pub fn new() -> Self {
        Self::with_api(FakeOpsLevel::new())
    }

    /// Create a tester around a prepared fake API.
    pub fn with_api(api: FakeOpsLevel) -> Self {
        let api = Arc::new(api);
        let options = ReconcileOptions::new().with_retry(RetryPolicy::new(
            2,
            std::time::Duration::from_millis(1),
            std::time::Duration::from_millis(5),
        ));
        let provider = OpsLevelProvider::with_options(api.clone(), options);
        Self { api, provider }
    }

    /// The fake API.
    pub fn api(&self) -> &FakeOpsLevel {
        &self.api
    }

    /// The provider under test.
    pub fn provider(&self) -> &OpsLevelProvider {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, &config)?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider.plan(resource_type, None, &proposed_state)
    }

    /// Plan a resource update.
    pub fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(&prior_state), &proposed_state)
    }

    /// Plan a resource deletion.
    pub fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(&prior_state), &Value::Null)
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<ImportedResource, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create.
    ///
    /// Returns the state after create, which already holds the values read
    /// back from the remote.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config)?;
        self.create(resource_type, plan.planned_state).await
    }

    /// Run a full update lifecycle: plan → update.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_update(resource_type, prior_state.clone(), proposed_state)?;
        self.update(resource_type, prior_state, plan.planned_state)
            .await
    }

    /// Run a full delete lifecycle: plan → delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone())?;
        self.delete(resource_type, current_state).await
    }

    /// Run a full CRUD lifecycle: create → update → delete.
    ///
    /// Returns the state after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created_state = self.lifecycle_create(resource_type, initial_config).await?;
        let updated_state = self
            .lifecycle_update(resource_type, created_state, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated_state.clone())
            .await?;
        Ok(updated_state)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan result indicates changes are needed.
///
/// # Panics
///
/// Panics if the plan has no changes.
pub fn assert_plan_has_changes(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes, but got no changes"
    );
}

/// Assert that a plan does not require resource replacement.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan has a change for a specific attribute.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan does not have a change for a specific attribute.
///
/// # Panics
///
/// Panics if the plan has a change for the given path.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    assert!(
        !plan.changes.iter().any(|c| c.path == path),
        "Expected plan to not change attribute '{}', but it was changed",
        path
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        diagnostics
            .iter()
            .any(|d| matches!(d.severity, DiagnosticSeverity::Error)),
        "Expected at least one error, but got none"
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| d.is_error() && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    const TRIGGER: &str = "opslevel_trigger_definition";
    const WEBHOOK: &str = "opslevel_webhook_action";

    #[tokio::test]
    async fn test_fake_records_calls_and_injects_failures() {
        let api = FakeOpsLevel::new();
        api.fail_next(ApiError::Unavailable("503".to_string()));

        let err = api.get_trigger_definition(&Id::new("td-1")).await.unwrap_err();
        assert_eq!(err, ApiError::Unavailable("503".to_string()));

        let err = api.get_trigger_definition(&Id::new("td-1")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(api.call_count(), 2);

        api.clear_calls();
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fake_allocates_prefixed_ids() {
        let api = FakeOpsLevel::new();
        let definition = api
            .create_trigger_definition(&TriggerDefinitionCreateInput {
                name: "deploy".to_string(),
                owner: Id::new("team-1"),
                action: None,
            })
            .await
            .unwrap();
        assert!(definition.id.as_str().starts_with("td-"));
        assert!(api.trigger_definition(definition.id.as_str()).is_some());

        api.remove(definition.id.as_str());
        assert!(api.trigger_definition(definition.id.as_str()).is_none());
    }

    #[test]
    fn test_tester_schema() {
        let tester = ProviderTester::new();
        let schema = tester.schema();
        assert!(schema.resources.contains_key(TRIGGER));
        assert!(schema.resources.contains_key(WEBHOOK));
        assert_eq!(tester.resource_types(), vec![TRIGGER.to_string(), WEBHOOK.to_string()]);
    }

    #[test]
    fn test_tester_validate_resource_config() {
        let tester = ProviderTester::new();
        assert!(tester
            .validate_resource_config(TRIGGER, json!({"name": "deploy", "owner": "team-1"}))
            .is_ok());

        let err = tester
            .validate_resource_config(TRIGGER, json!({"name": "deploy"}))
            .unwrap_err();
        assert!(err.to_string().contains("owner"));
    }

    #[tokio::test]
    async fn test_lifecycle_crud() {
        let tester = ProviderTester::new();
        let updated = tester
            .lifecycle_crud(
                WEBHOOK,
                json!({
                    "name": "page",
                    "liquid_template": "{}",
                    "webhook_url": "https://hooks.example.com/a",
                    "http_method": "POST"
                }),
                json!({
                    "name": "page",
                    "liquid_template": "{}",
                    "webhook_url": "https://hooks.example.com/b",
                    "http_method": "POST"
                }),
            )
            .await
            .unwrap();

        assert_eq!(updated["webhook_url"], "https://hooks.example.com/b");
        let id = updated["id"].as_str().unwrap();
        assert!(tester.api().webhook_action(id).is_none());
    }

    #[tokio::test]
    async fn test_tester_retries_are_fast() {
        let tester = ProviderTester::new();
        tester.api().fail_next(ApiError::Timeout(Duration::from_secs(30)));
        let imported = tester.import_resource(TRIGGER, "td-1").await;
        assert!(imported.unwrap_err().is_gone());
        assert_eq!(tester.api().call_count(), 2);
    }

    #[test]
    fn test_assert_helpers() {
        let plan = PlanResult::no_change(json!({"id": "td-1"}));
        assert_plan_no_changes(&plan);
        assert_plan_updates_in_place(&plan);
        assert_plan_does_not_change_attribute(&plan, "name");

        let diagnostics = vec![Diagnostic::error("Missing required attribute 'owner'")];
        assert_has_errors(&diagnostics);
        assert_error_contains(&diagnostics, "owner");
        assert_no_errors(&[Diagnostic::warning("deprecated")]);
    }

    #[test]
    #[should_panic(expected = "Expected plan to have changes")]
    fn test_assert_plan_has_changes_panics() {
        assert_plan_has_changes(&PlanResult::no_change(json!({})));
    }
}
