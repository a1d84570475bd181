//! Password filter configuration.
//!
//! The configuration lives in a JSON file outside the process. It is parsed
//! into an immutable [`ConfigSnapshot`] and published by the
//! [`ConfigManager`]; a [`ConfigWatcher`] reloads it whenever the file
//! changes.

mod manager;
mod schema;
mod watcher;

pub use manager::{ConfigManager, RefreshOutcome};
pub use schema::{ConfigError, FieldKind};
pub use watcher::ConfigWatcher;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV_VAR: &str = "BCV_PWF_CONFIG_FILE_PATH";

#[cfg(windows)]
pub const DEFAULT_CONFIG_PATH: &str = "c:/CzechIdM/PasswordFilter/etc/PasswordFilterConfig.cfg";
#[cfg(not(windows))]
pub const DEFAULT_CONFIG_PATH: &str = "/etc/idm-password-filter/PasswordFilterConfig.cfg";

/// How often the watcher looks at the configuration file.
pub const DEFAULT_CHECK_PERIOD: Duration = Duration::from_secs(3);

/// Immutable view of one successfully parsed configuration file.
///
/// A snapshot is never modified after it is published; a reload builds a
/// new one and swaps it in.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    /// IdM endpoints in failover order.
    pub base_urls: Vec<String>,
    pub check_path: String,
    pub notify_path: String,
    /// Shared secret sent in the `CIDMST` header. Never logged.
    pub token: String,
    /// Disables TLS certificate validation when set.
    pub ignore_certificate: bool,
    /// Attempts per base URL, at least one.
    pub connection_attempts: u32,
    pub connection_timeout_ms: u32,
    pub system_id: String,
    pub allow_change_by_default: bool,
    /// Accounts starting with any of these bypass IdM entirely.
    pub skipped_account_prefixes: Vec<String>,
    pub log_level: String,
    pub password_filter_enabled: bool,
    /// False only for the placeholder used before the first successful load.
    pub valid: bool,
}

impl ConfigSnapshot {
    /// Placeholder published until a configuration file has been parsed.
    ///
    /// While this is the current snapshot the filter approves every change
    /// and skips notification.
    pub fn uninitialized() -> Self {
        Self {
            base_urls: Vec::new(),
            check_path: String::new(),
            notify_path: String::new(),
            token: String::new(),
            ignore_certificate: false,
            connection_attempts: 1,
            connection_timeout_ms: 30_000,
            system_id: String::new(),
            allow_change_by_default: true,
            skipped_account_prefixes: Vec::new(),
            log_level: "DEBUG".to_string(),
            password_filter_enabled: true,
            valid: false,
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.connection_timeout_ms))
    }

    pub fn validate_certificates(&self) -> bool {
        !self.ignore_certificate
    }

    /// Upper bound on the time a single policy check can block:
    /// every base URL times every attempt times the timeout.
    ///
    /// Operators are expected to keep this small; the host blocks the
    /// password change for at most this long.
    pub fn worst_case_latency(&self) -> Duration {
        let attempts = (self.base_urls.len() as u32).saturating_mul(self.connection_attempts);
        self.connection_timeout()
            .checked_mul(attempts)
            .unwrap_or(Duration::MAX)
    }

    /// Returns true when the account name starts with a configured
    /// skip-prefix. An empty account name never matches.
    pub fn is_skipped_account(&self, account: &str) -> bool {
        if account.is_empty() {
            return false;
        }
        self.skipped_account_prefixes
            .iter()
            .any(|prefix| account.starts_with(prefix.as_str()))
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::uninitialized()
    }
}

impl fmt::Debug for ConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSnapshot")
            .field("base_urls", &self.base_urls)
            .field("check_path", &self.check_path)
            .field("notify_path", &self.notify_path)
            .field("token", &"<redacted>")
            .field("ignore_certificate", &self.ignore_certificate)
            .field("connection_attempts", &self.connection_attempts)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("system_id", &self.system_id)
            .field("allow_change_by_default", &self.allow_change_by_default)
            .field("skipped_account_prefixes", &self.skipped_account_prefixes)
            .field("log_level", &self.log_level)
            .field("password_filter_enabled", &self.password_filter_enabled)
            .field("valid", &self.valid)
            .finish()
    }
}

/// Where to find the configuration file: an environment variable override,
/// falling back to a fixed path. Resolved again on every refresh so the
/// file can be relocated without a restart.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    env_var: String,
    default_path: PathBuf,
}

impl ConfigLocator {
    pub fn new(env_var: impl Into<String>, default_path: impl Into<PathBuf>) -> Self {
        Self {
            env_var: env_var.into(),
            default_path: default_path.into(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        match std::env::var_os(&self.env_var) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => self.default_path.clone(),
        }
    }
}

impl Default for ConfigLocator {
    fn default() -> Self {
        Self::new(CONFIG_PATH_ENV_VAR, DEFAULT_CONFIG_PATH)
    }
}
