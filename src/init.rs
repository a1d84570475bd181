//! Initialization helpers for the application startup.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Lets the configured log level be re-applied after a reload.
#[derive(Clone)]
pub struct LogLevelHandle {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
    // RUST_LOG takes precedence over the configuration file.
    pinned: bool,
}

impl LogLevelHandle {
    pub fn apply(&self, configured: &str) {
        if self.pinned {
            return;
        }
        if let Some(handle) = &self.handle {
            if let Err(e) = handle.reload(EnvFilter::new(filter_directive(configured))) {
                eprintln!("Failed to apply log level {}: {}", configured, e);
            }
        }
    }
}

/// Maps the configured level name (`DEBUG`, `INFO`, `WARN`, `ERROR`, any
/// case) to a filter directive. Unknown names fall back to debug.
pub fn filter_directive(configured: &str) -> String {
    let level = match configured.trim().to_ascii_uppercase().as_str() {
        "ERROR" => "error",
        "WARN" => "warn",
        "INFO" => "info",
        _ => "debug",
    };

    // HTTP client internals are noisy at debug.
    format!("{},hyper=warn,hyper_util=warn,rustls=warn,reqwest=info", level)
}

/// Sets up the tracing subscriber. The returned handle re-applies the
/// configured level whenever a new configuration is published.
pub fn setup_logging(initial_level: &str) -> LogLevelHandle {
    let (env_filter, pinned) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(filter_directive(initial_level)), false),
    };

    let (filter_layer, handle) = reload::Layer::new(env_filter);
    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer())
        .try_init()
        .is_ok();

    LogLevelHandle {
        handle: installed.then_some(handle),
        pinned,
    }
}
