//! Error types for the OpsLevel provider.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors returned by the remote OpsLevel API client.
///
/// Client implementations classify their failures into these variants so the
/// reconciler can decide between retrying, treating the resource as gone, or
/// surfacing the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The addressed object does not exist on the remote side.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The API could not be reached or answered with a retryable failure.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the allotted time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The API answered with an error for this request (GraphQL errors,
    /// authorization failures, invalid input).
    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl ApiError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    /// Whether the error reports a missing remote object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors that can occur while reconciling a resource.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The configuration failed validation. No remote call was made.
    #[error("Validation error: {}", summarize(.0))]
    Validation(Vec<Diagnostic>),

    /// A create, update or delete call against the remote API failed.
    #[error("Remote operation failed: {operation}: {source}")]
    RemoteOperationFailed {
        /// The remote operation that failed, e.g. `create_webhook_action`.
        operation: String,
        /// The underlying client error.
        #[source]
        source: ApiError,
    },

    /// The remote resource no longer exists.
    #[error("Resource not found: {0}")]
    ResourceGone(String),

    /// The local state store rejected a write after a successful remote read.
    #[error("Local state write failed: {0}")]
    LocalStateWriteFailed(String),

    /// The remote object was created but confirming it failed.
    ///
    /// `state` holds the new identifier and the desired values. The host must
    /// persist it so the next run reads or updates the object instead of
    /// creating it again.
    #[error("Resource created but not confirmed: {source}")]
    IncompleteCreate {
        /// The desired values plus the assigned `id`.
        state: Value,
        /// Why the read-back failed.
        #[source]
        source: Box<ProviderError>,
    },

    /// The operation was invoked in a state that does not allow it.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// The provider configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Build a validation error for a single attribute.
    pub fn invalid_attribute(attribute: &str, summary: impl Into<String>) -> Self {
        Self::Validation(vec![Diagnostic::error(summary).with_attribute(attribute)])
    }

    /// Wrap a client error raised by `operation`.
    ///
    /// Not-found answers become [`ProviderError::ResourceGone`], everything
    /// else is reported as a failed remote operation.
    pub fn remote(operation: impl Into<String>, id: &str, source: ApiError) -> Self {
        if source.is_not_found() {
            Self::ResourceGone(id.to_string())
        } else {
            Self::RemoteOperationFailed {
                operation: operation.into(),
                source,
            }
        }
    }

    /// Whether this error reports a resource that no longer exists remotely.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::ResourceGone(_))
    }

    /// The state to persist despite the error, if a remote object exists.
    pub fn partial_state(&self) -> Option<&Value> {
        match self {
            Self::IncompleteCreate { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Get the error message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Validation(diagnostics) => summarize(diagnostics),
            Self::RemoteOperationFailed { operation, source } => {
                format!("{}: {}", operation, source)
            },
            Self::IncompleteCreate { source, .. } => source.message(),
            Self::ResourceGone(msg)
            | Self::LocalStateWriteFailed(msg)
            | Self::FailedPrecondition(msg)
            | Self::UnknownResource(msg)
            | Self::Configuration(msg) => msg.clone(),
            Self::Serialization(err) => err.to_string(),
        }
    }

    /// The diagnostics carried by a validation error, empty otherwise.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Validation(diagnostics) => diagnostics,
            _ => &[],
        }
    }
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.summary.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::ResourceGone("td-123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: td-123");

        let err = ProviderError::UnknownResource("opslevel_check".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: opslevel_check");

        let err = ProviderError::LocalStateWriteFailed("unknown attribute 'foo'".to_string());
        assert_eq!(
            format!("{}", err),
            "Local state write failed: unknown attribute 'foo'"
        );
    }

    #[test]
    fn test_validation_display_joins_summaries() {
        let err = ProviderError::Validation(vec![
            Diagnostic::error("Missing required attribute 'name'"),
            Diagnostic::error("Missing required attribute 'owner'"),
        ]);
        assert_eq!(
            format!("{}", err),
            "Validation error: Missing required attribute 'name'; Missing required attribute 'owner'"
        );
        assert_eq!(err.diagnostics().len(), 2);
    }

    #[test]
    fn test_remote_maps_not_found_to_gone() {
        let err = ProviderError::remote(
            "get_trigger_definition",
            "td-1",
            ApiError::NotFound("trigger definition".to_string()),
        );
        assert!(err.is_gone());
        assert_eq!(err.message(), "td-1");

        let err = ProviderError::remote(
            "create_webhook_action",
            "",
            ApiError::Rejected("name has already been taken".to_string()),
        );
        assert!(matches!(
            err,
            ProviderError::RemoteOperationFailed { ref operation, .. }
                if operation == "create_webhook_action"
        ));
        assert_eq!(
            format!("{}", err),
            "Remote operation failed: create_webhook_action: Request rejected: name has already been taken"
        );
    }

    #[test]
    fn test_incomplete_create_carries_state() {
        let err = ProviderError::IncompleteCreate {
            state: serde_json::json!({"id": "td-1", "name": "deploy"}),
            source: Box::new(ProviderError::LocalStateWriteFailed("disk full".to_string())),
        };
        assert_eq!(err.partial_state().unwrap()["id"], "td-1");
        assert_eq!(err.message(), "disk full");
        assert_eq!(
            format!("{}", err),
            "Resource created but not confirmed: Local state write failed: disk full"
        );
        assert!(ProviderError::ResourceGone("td-1".to_string())
            .partial_state()
            .is_none());
    }

    #[test]
    fn test_api_error_classification() {
        assert!(ApiError::Unavailable("502".to_string()).is_transient());
        assert!(ApiError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ApiError::Rejected("bad".to_string()).is_transient());
        assert!(!ApiError::NotFound("x".to_string()).is_transient());
        assert!(ApiError::NotFound("x".to_string()).is_not_found());
    }

    #[test]
    fn test_invalid_attribute() {
        let err = ProviderError::invalid_attribute("http_method", "Invalid value 'FETCH'");
        let diagnostics = err.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("http_method".to_string()));
        assert_eq!(err.message(), "Invalid value 'FETCH'");
    }
}
