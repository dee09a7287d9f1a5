//! Hemmer Provider for OpsLevel
//!
//! This crate manages OpsLevel custom actions objects from declarative
//! configuration:
//!
//! - `opslevel_trigger_definition`: a trigger definition with a name, an
//!   owning team and an optional action to trigger
//! - `opslevel_webhook_action`: a webhook with a payload template, URL, HTTP
//!   method and headers
//!
//! # Overview
//!
//! - **Reconciler**: a generic create/read/update/delete driver that
//!   validates before calling out, sends only changed fields, reads back
//!   after every mutation and clears identifiers of resources that vanished
//! - **Resources**: per-kind field tables plugged into the reconciler
//! - **Provider**: routes JSON state documents by resource type, plans
//!   changes and imports existing objects
//! - **Client**: the [`OpsLevelApi`] trait the host implements over its
//!   GraphQL transport
//! - **Testing**: an in-memory [`testing::FakeOpsLevel`] and a
//!   [`testing::ProviderTester`] harness
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use hemmer_provider_opslevel::testing::FakeOpsLevel;
//! use hemmer_provider_opslevel::{OpsLevelProvider, ProviderConfig};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let config = ProviderConfig::resolve(json!({"api_token": "token"}), |_| None).unwrap();
//! let provider = OpsLevelProvider::from_config(Arc::new(FakeOpsLevel::new()), &config);
//!
//! let state = provider
//!     .create("opslevel_webhook_action", json!({
//!         "name": "page on-call",
//!         "liquid_template": "{\"service\": \"{{ service.name }}\"}",
//!         "webhook_url": "https://hooks.example.com/page",
//!         "http_method": "POST"
//!     }))
//!     .await
//!     .unwrap();
//!
//! assert!(state["id"].as_str().unwrap().starts_with("wa-"));
//! # });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod reconciler;
pub mod resources;
pub mod retry;
pub mod schema;
pub mod state;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{DynApi, OpsLevelApi};
pub use config::ProviderConfig;
pub use error::{ApiError, ProviderError};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{OpsLevelProvider, ResourceHandler};
pub use reconciler::{ChangeSet, ReconcileOptions, Reconciler, ResourceKind};
pub use retry::RetryPolicy;
pub use schema::ProviderSchema;
pub use state::{ResourceData, ResourceState};
pub use types::{AttributeChange, HttpMethod, Id, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
