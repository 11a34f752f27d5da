//! Tracing initialization
//!
//! Structured logging with env-filter control; JSON output for log
//! shippers. Secrets never reach this layer: callers sanitize with
//! [`crate::security`] before logging upstream error text.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the process-wide tracing subscriber
///
/// `RUST_LOG` wins over the `verbose` flag; repeated calls are a no-op so
/// tests can initialize freely.
pub fn init_logging(verbose: bool, json: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };

    // Already initialized: fine, keep the existing subscriber
    let _ = result;
}
