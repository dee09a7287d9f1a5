//! Logging and tracing setup.
//!
//! The provider logs through `tracing`: lifecycle operations open spans
//! carrying the resource type and identifier, mutations log at `info`, reads
//! at `debug` and retries at `warn`. All output goes to **stderr** so it
//! never mixes with data the host reads from stdout.
//!
//! # Environment Variables
//!
//! - `OPSLEVEL_LOG`: log filter for the provider, takes precedence
//! - `RUST_LOG`: fallback filter (e.g., `info`, `hemmer_provider_opslevel=debug`)
//!
//! # Examples
//!
//! ```bash
//! # Show every remote call and retry
//! OPSLEVEL_LOG=hemmer_provider_opslevel=debug ./my-host
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable with the provider-specific log filter.
pub const LOG_ENV: &str = "OPSLEVEL_LOG";

/// Build the filter from `OPSLEVEL_LOG`, then `RUST_LOG`, then `default_level`.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn subscriber(
    default_level: &str,
) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(env_filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Initialize the default logging subscriber at `info` level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
///
/// # Example
///
/// ```ignore
/// use hemmer_provider_opslevel::init_logging;
///
/// init_logging();
/// tracing::info!("Provider starting");
/// ```
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level, used when neither
/// `OPSLEVEL_LOG` nor `RUST_LOG` is set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to initialize logging, returning false if already initialized.
///
/// Unlike [`init_logging`], this function does not panic if a subscriber
/// has already been set, which makes it safe to call from tests.
pub fn try_init_logging() -> bool {
    subscriber("info").try_init().is_ok()
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so only
    // filter parsing and the non-panicking initializer are tested here.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("hemmer_provider_opslevel=debug").is_ok());
        assert!(EnvFilter::try_new("warn,hemmer_provider_opslevel::reconciler=trace").is_ok());
    }

    #[test]
    fn test_try_init_logging_is_idempotent() {
        try_init_logging();
        assert!(!try_init_logging());
    }
}
