//! Provider configuration.
//!
//! The provider block accepts the API endpoint, the API token and the
//! reliability settings. Unset values fall back to the environment
//! (`OPSLEVEL_API_URL`, `OPSLEVEL_API_TOKEN`) and then to built-in defaults.
//!
//! ```
//! use hemmer_provider_opslevel::config::ProviderConfig;
//! use serde_json::json;
//!
//! let config = ProviderConfig::resolve(json!({"api_timeout": 10}), |_| None).unwrap();
//! assert_eq!(config.api_url, "https://app.opslevel.com/graphql");
//! assert_eq!(config.reconcile_options().timeout.as_secs(), 10);
//! assert!(config.api_token().is_err());
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::reconciler::ReconcileOptions;
use crate::retry::RetryPolicy;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::validation::validate;

/// The public OpsLevel GraphQL endpoint.
pub const DEFAULT_API_URL: &str = "https://app.opslevel.com/graphql";

/// Environment variable overriding the default API URL.
pub const API_URL_ENV: &str = "OPSLEVEL_API_URL";

/// Environment variable supplying the API token.
pub const API_TOKEN_ENV: &str = "OPSLEVEL_API_TOKEN";

/// Settings from the provider configuration block.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// GraphQL endpoint.
    pub api_url: String,
    /// API token. Never logged.
    pub api_token: Option<String>,
    /// Per-call timeout in seconds.
    pub api_timeout: u64,
    /// Retries for transient failures.
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            api_timeout: 30,
            max_retries: 3,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("api_timeout", &self.api_timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ProviderConfig {
    /// Schema of the provider configuration block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("OpsLevel provider configuration")
            .with_attribute(
                "api_url",
                Attribute::optional_string().with_description(format!(
                    "The url of the OpsLevel API. Defaults to ${} or {}",
                    API_URL_ENV, DEFAULT_API_URL
                )),
            )
            .with_attribute(
                "api_token",
                Attribute::optional_string().sensitive().with_description(format!(
                    "The API authorization token. Defaults to ${}",
                    API_TOKEN_ENV
                )),
            )
            .with_attribute(
                "api_timeout",
                Attribute::optional_int64().with_description(
                    "Value in seconds to use for the timeout of each API call. Defaults to 30",
                ),
            )
            .with_attribute(
                "max_retries",
                Attribute::optional_int64()
                    .with_description("Retries for transient API failures. Defaults to 3"),
            )
    }

    /// Validate a configuration block.
    pub fn validate(value: &Value) -> Vec<Diagnostic> {
        if value.is_null() {
            return Vec::new();
        }
        validate(&Self::schema(), value)
    }

    /// Parse a configuration block, filling unset values from the process
    /// environment.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        Self::resolve(value, |name| std::env::var(name).ok())
    }

    /// Parse a configuration block, filling unset values through `lookup`.
    pub fn resolve(
        value: Value,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ProviderError> {
        let mut diagnostics = Self::validate(&value);
        if diagnostics.is_empty() {
            diagnostics = Self::check_ranges(&value);
        }
        if !diagnostics.is_empty() {
            return Err(ProviderError::Validation(diagnostics));
        }

        let mut fields = match value {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        fields.retain(|_, v| !v.is_null());
        let url_set = fields.contains_key("api_url");

        let mut config: Self = serde_json::from_value(Value::Object(fields))?;
        if !url_set {
            if let Some(url) = lookup(API_URL_ENV).filter(|url| !url.is_empty()) {
                config.api_url = url;
            }
        }
        if config.api_token.is_none() {
            config.api_token = lookup(API_TOKEN_ENV).filter(|token| !token.is_empty());
        }

        if config.api_url.is_empty() {
            return Err(ProviderError::Configuration("api_url must not be empty".to_string()));
        }
        if config.api_timeout == 0 {
            return Err(ProviderError::Configuration(
                "api_timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(config)
    }

    /// Integer settings must fit their field types before deserialization.
    fn check_ranges(value: &Value) -> Vec<Diagnostic> {
        [("api_timeout", u64::MAX), ("max_retries", u64::from(u32::MAX))]
            .into_iter()
            .filter_map(|(name, max)| {
                let raw = value.get(name).filter(|v| !v.is_null())?;
                match raw.as_u64() {
                    Some(n) if n <= max => None,
                    _ => Some(
                        Diagnostic::error(format!(
                            "Attribute '{}' must be an integer between 0 and {}",
                            name, max
                        ))
                        .with_attribute(name),
                    ),
                }
            })
            .collect()
    }

    /// The API token, required before any API client can be built.
    pub fn api_token(&self) -> Result<&str, ProviderError> {
        self.api_token.as_deref().ok_or_else(|| {
            ProviderError::Configuration(format!(
                "no API token configured: set api_token or {}",
                API_TOKEN_ENV
            ))
        })
    }

    /// Timeout and retry settings for the reconcilers.
    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions::new()
            .with_timeout(Duration::from_secs(self.api_timeout))
            .with_retry(RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            })
    }
}
