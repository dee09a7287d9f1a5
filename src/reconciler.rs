//! Generic create/read/update/delete reconciliation.
//!
//! A [`Reconciler`] drives one resource kind through its lifecycle against the
//! OpsLevel API. The per-kind details (field tables, request shapes, which API
//! call to make) live behind [`ResourceKind`]; the reconciler owns the
//! invariants shared by every kind:
//!
//! - configuration is validated before any remote call is made
//! - updates only carry the fields in the [`ChangeSet`]
//! - every mutation is followed by a read, and the server-confirmed values are
//!   written back into the [`ResourceData`] store
//! - a resource the remote reports as missing loses its local identifier
//!
//! ```text
//! Absent --create--> Present --update--> Present
//!    ^                  |
//!    +---delete---------+
//!    +---read (not found)
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::client::{DynApi, OpsLevelApi};
use crate::error::{ApiError, ProviderError};
use crate::retry::{retry_call, RetryPolicy};
use crate::schema::Schema;
use crate::state::ResourceData;
use crate::types::Id;
use crate::validation::validate_result;

/// The configurable fields whose desired value differs from the last-applied
/// value. Iterates in field-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet(BTreeSet<String>);

impl ChangeSet {
    /// Collect the changed fields among `fields`.
    pub fn detect<'a>(data: &dyn ResourceData, fields: impl IntoIterator<Item = &'a str>) -> Self {
        Self(
            fields
                .into_iter()
                .filter(|field| data.has_change(field))
                .map(str::to_string)
                .collect(),
        )
    }

    /// Whether `field` changed.
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of changed fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The changed field names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.iter().collect::<Vec<_>>().join(", "))
    }
}

/// Timeout and retry settings applied to every remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Upper bound for a single remote call attempt.
    pub timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl ReconcileOptions {
    /// Create options with the defaults (30s per call, 3 retries).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// The per-kind half of a resource handler.
///
/// Implementations are small field tables: how configuration becomes a typed
/// desired record, how that record becomes create and update requests, and
/// how a remote record is written back into the store.
#[async_trait]
pub trait ResourceKind: Send + Sync + 'static {
    /// The resource type name as used in configuration, e.g.
    /// `opslevel_trigger_definition`.
    const TYPE_NAME: &'static str;

    /// The object name used in remote operation names, e.g.
    /// `trigger_definition` for `create_trigger_definition`.
    const API_NAME: &'static str;

    /// Validated desired state.
    type Desired: fmt::Debug + Send + Sync;
    /// The record returned by the remote API.
    type Remote: fmt::Debug + Clone + Send + Sync;
    /// Create request.
    type Create: fmt::Debug + Send + Sync;
    /// Partial update request.
    type Update: fmt::Debug + Send + Sync;

    /// The resource schema. The API client is consulted for capability lists
    /// such as accepted enum values.
    fn schema(&self, api: &dyn OpsLevelApi) -> Schema;

    /// Build the typed desired state from the store.
    fn desired(&self, data: &dyn ResourceData) -> Result<Self::Desired, ProviderError>;

    /// Build the create request.
    fn create_input(&self, desired: &Self::Desired) -> Self::Create;

    /// Build an update request carrying only the fields in `changes`.
    fn update_input(&self, id: &Id, desired: &Self::Desired, changes: &ChangeSet) -> Self::Update;

    /// The identifier of a remote record.
    fn remote_id(remote: &Self::Remote) -> &Id;

    /// The remote record implied by `desired` when it is known to be applied.
    fn assume(&self, id: Id, desired: Self::Desired) -> Self::Remote;

    /// Every stored field of a remote record. Unset optional values are
    /// reported as `null`.
    fn flatten(&self, remote: &Self::Remote) -> Vec<(&'static str, Value)>;

    /// Issue the create call.
    async fn create(
        &self,
        api: &dyn OpsLevelApi,
        input: &Self::Create,
    ) -> Result<Self::Remote, ApiError>;

    /// Issue the get call.
    async fn get(&self, api: &dyn OpsLevelApi, id: &Id) -> Result<Self::Remote, ApiError>;

    /// Issue the update call.
    async fn update(
        &self,
        api: &dyn OpsLevelApi,
        input: &Self::Update,
    ) -> Result<Self::Remote, ApiError>;

    /// Issue the delete call.
    async fn delete(&self, api: &dyn OpsLevelApi, id: &Id) -> Result<(), ApiError>;
}

/// Drives one resource kind through create, read, update and delete.
pub struct Reconciler<K: ResourceKind> {
    kind: K,
    api: DynApi,
    schema: Schema,
    options: ReconcileOptions,
}

impl<K: ResourceKind> Reconciler<K> {
    /// Create a reconciler for `kind` backed by `api`.
    pub fn new(kind: K, api: DynApi, options: ReconcileOptions) -> Self {
        let schema = kind.schema(api.as_ref());
        Self {
            kind,
            api,
            schema,
            options,
        }
    }

    /// The resource schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The timeout and retry settings.
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Create the remote resource described by `data`.
    ///
    /// On success the identifier is stored and every field holds the value
    /// read back from the remote. When the create call fails the identifier
    /// stays unset.
    #[instrument(skip(self, data), fields(resource_type = K::TYPE_NAME))]
    pub async fn create(&self, data: &mut dyn ResourceData) -> Result<K::Remote, ProviderError> {
        let desired = self.desired(&*data)?;
        let input = self.kind.create_input(&desired);
        debug!(?input, "Creating resource");

        let (kind, api, input) = (&self.kind, self.api.as_ref(), &input);
        let created = self
            .call("create", None, false, move || kind.create(api, input))
            .await
            .map_err(|err| {
                error!(error = %err, "Create failed");
                err
            })?;

        let id = K::remote_id(&created).clone();
        data.set_id(id.as_str());
        info!(id = %id, "Created resource");

        match self.refresh(data, &id).await {
            Ok(remote) => Ok(remote),
            Err(err) => {
                if err.is_gone() {
                    data.clear_id();
                }
                error!(id = %id, error = %err, "Reading back created resource failed");
                Err(err)
            },
        }
    }

    /// Fetch the remote record for `id` without touching local state.
    ///
    /// A missing resource is reported as [`ProviderError::ResourceGone`].
    #[instrument(skip(self), fields(resource_type = K::TYPE_NAME))]
    pub async fn fetch(&self, id: &Id) -> Result<K::Remote, ProviderError> {
        let (kind, api) = (&self.kind, self.api.as_ref());
        let remote = self
            .call("get", Some(id), true, move || kind.get(api, id))
            .await?;
        debug!(?remote, "Fetched resource");
        Ok(remote)
    }

    /// Refresh `data` from the remote.
    ///
    /// Returns `None` and clears the identifier when the remote no longer has
    /// the resource, or when there is no identifier to look up.
    #[instrument(skip(self, data), fields(resource_type = K::TYPE_NAME, id = data.id()))]
    pub async fn read(
        &self,
        data: &mut dyn ResourceData,
    ) -> Result<Option<K::Remote>, ProviderError> {
        let Some(id) = Id::optional(data.id()) else {
            debug!("No identifier, nothing to read");
            return Ok(None);
        };

        match self.fetch(&id).await {
            Ok(remote) => {
                self.write_back(data, &remote)?;
                Ok(Some(remote))
            },
            Err(err) if err.is_gone() => {
                warn!("Resource no longer exists remotely, removing it from state");
                data.clear_id();
                Ok(None)
            },
            Err(err) => Err(err),
        }
    }

    /// Apply the changed fields of `data` to the remote.
    ///
    /// When no configurable field changed, no call is made and the resource
    /// is assembled from the desired state.
    #[instrument(skip(self, data), fields(resource_type = K::TYPE_NAME, id = data.id()))]
    pub async fn update(&self, data: &mut dyn ResourceData) -> Result<K::Remote, ProviderError> {
        let id = Id::optional(data.id()).ok_or_else(|| {
            ProviderError::FailedPrecondition(format!(
                "cannot update {} without an identifier",
                K::TYPE_NAME
            ))
        })?;
        let desired = self.desired(&*data)?;

        let changes = ChangeSet::detect(&*data, self.schema.configurable());
        if changes.is_empty() {
            debug!("No changes detected, skipping update");
            return Ok(self.kind.assume(id, desired));
        }

        let input = self.kind.update_input(&id, &desired, &changes);
        debug!(?input, "Updating resource");

        let (kind, api, input_ref) = (&self.kind, self.api.as_ref(), &input);
        self.call("update", Some(&id), true, move || kind.update(api, input_ref))
            .await
            .map_err(|err| {
                error!(error = %err, "Update failed");
                err
            })?;
        info!(changed = %changes, "Updated resource");

        self.refresh(data, &id).await
    }

    /// Delete the remote resource and clear the identifier.
    ///
    /// Deleting a resource that is already gone, or that never had an
    /// identifier, succeeds.
    #[instrument(skip(self, data), fields(resource_type = K::TYPE_NAME, id = data.id()))]
    pub async fn delete(&self, data: &mut dyn ResourceData) -> Result<(), ProviderError> {
        let Some(id) = Id::optional(data.id()) else {
            debug!("No identifier, nothing to delete");
            return Ok(());
        };

        let (kind, api, id_ref) = (&self.kind, self.api.as_ref(), &id);
        match self
            .call("delete", Some(&id), true, move || kind.delete(api, id_ref))
            .await
        {
            Ok(()) => info!("Deleted resource"),
            Err(err) if err.is_gone() => debug!("Resource already deleted"),
            Err(err) => {
                error!(error = %err, "Delete failed");
                return Err(err);
            },
        }

        data.clear_id();
        Ok(())
    }

    fn desired(&self, data: &dyn ResourceData) -> Result<K::Desired, ProviderError> {
        let config: Map<String, Value> = self
            .schema
            .configurable()
            .filter_map(|name| data.get(name).map(|v| (name.to_string(), v.clone())))
            .collect();
        validate_result(&self.schema, &Value::Object(config)).map_err(ProviderError::Validation)?;
        self.kind.desired(data)
    }

    async fn refresh(
        &self,
        data: &mut dyn ResourceData,
        id: &Id,
    ) -> Result<K::Remote, ProviderError> {
        let remote = self.fetch(id).await?;
        self.write_back(data, &remote)?;
        Ok(remote)
    }

    fn write_back(
        &self,
        data: &mut dyn ResourceData,
        remote: &K::Remote,
    ) -> Result<(), ProviderError> {
        data.set_id(K::remote_id(remote).as_str());
        for (field, value) in self.kind.flatten(remote) {
            data.set(field, value)?;
        }
        Ok(())
    }

    /// Run a remote call under the configured timeout and retry policy.
    ///
    /// With an `id`, a not-found answer becomes [`ProviderError::ResourceGone`].
    async fn call<T, F, Fut>(
        &self,
        verb: &str,
        id: Option<&Id>,
        idempotent: bool,
        call: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let operation = format!("{}_{}", verb, K::API_NAME);
        let result = retry_call(
            &self.options.retry,
            self.options.timeout,
            &operation,
            idempotent,
            call,
        )
        .await;
        result.map_err(|source| match id {
            Some(id) => ProviderError::remote(operation, id.as_str(), source),
            None => ProviderError::RemoteOperationFailed { operation, source },
        })
    }
}
