//! Validation of the configuration file against its expected shape.

use super::ConfigSnapshot;
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

const REST_BASE_URL_KEY: &str = "restBaseUrl";
const REST_CHECK_URL_KEY: &str = "restCheckUrl";
const REST_NOTIFY_URL_KEY: &str = "restNotifyUrl";
const TOKEN_KEY: &str = "token";
const IGNORE_CERTIFICATE_KEY: &str = "ignoreCertificate";
const CONNECTION_ATTEMPTS_KEY: &str = "connectionAttempts";
const CONNECTION_TIMEOUT_MS_KEY: &str = "connectionTimeoutMs";
const SYSTEM_ID_KEY: &str = "systemId";
const ALLOW_CHANGE_BY_DEFAULT_KEY: &str = "allowChangeByDefault";
const SKIPPED_ACCOUNT_PREFIXES_KEY: &str = "skippedAccountPrefixes";
const LOG_LEVEL_KEY: &str = "logLevel";
const PASSWORD_FILTER_ENABLED_KEY: &str = "passwordFilterEnabled";

/// The JSON kind a required field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    StringArray,
    Bool,
    UnsignedInt,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::StringArray => "array of strings",
            FieldKind::Bool => "boolean",
            FieldKind::UnsignedInt => "unsigned integer",
        };
        f.write_str(name)
    }
}

/// Why a configuration file was rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("configuration is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration root is not a JSON object")]
    NotAnObject,
    #[error("required field \"{field}\" is missing")]
    MissingField { field: &'static str },
    #[error("field \"{field}\" must be a {expected}")]
    WrongKind {
        field: &'static str,
        expected: FieldKind,
    },
    #[error("field \"{field}\" is out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        reason: &'static str,
    },
}

impl ConfigError {
    /// Name of the offending field, when the failure is tied to one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ConfigError::MissingField { field }
            | ConfigError::WrongKind { field, .. }
            | ConfigError::OutOfRange { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Looks up `field` and checks that it has the `expected` kind.
fn require<'a>(
    root: &'a Map<String, Value>,
    field: &'static str,
    expected: FieldKind,
) -> Result<&'a Value, ConfigError> {
    let value = root.get(field).ok_or(ConfigError::MissingField { field })?;

    let matches = match expected {
        FieldKind::String => value.is_string(),
        FieldKind::Bool => value.is_boolean(),
        FieldKind::UnsignedInt => value.is_u64(),
        FieldKind::StringArray => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
    };

    if matches {
        Ok(value)
    } else {
        Err(ConfigError::WrongKind { field, expected })
    }
}

fn require_string(root: &Map<String, Value>, field: &'static str) -> Result<String, ConfigError> {
    let value = require(root, field, FieldKind::String)?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

fn require_bool(root: &Map<String, Value>, field: &'static str) -> Result<bool, ConfigError> {
    let value = require(root, field, FieldKind::Bool)?;
    Ok(value.as_bool().unwrap_or_default())
}

fn require_u32(root: &Map<String, Value>, field: &'static str) -> Result<u32, ConfigError> {
    let value = require(root, field, FieldKind::UnsignedInt)?;
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(ConfigError::OutOfRange {
            field,
            reason: "does not fit into 32 bits",
        })
}

fn require_strings(
    root: &Map<String, Value>,
    field: &'static str,
) -> Result<Vec<String>, ConfigError> {
    let value = require(root, field, FieldKind::StringArray)?;
    Ok(value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default())
}

/// Parses configuration file content into a valid snapshot.
///
/// Every required field is checked before anything is built; a single
/// missing or mistyped field rejects the whole file.
pub(crate) fn parse_snapshot(content: &str) -> Result<ConfigSnapshot, ConfigError> {
    let root: Value = serde_json::from_str(content)?;
    let root = root.as_object().ok_or(ConfigError::NotAnObject)?;

    let base_urls = require_strings(root, REST_BASE_URL_KEY)?;
    if base_urls.is_empty() {
        return Err(ConfigError::OutOfRange {
            field: REST_BASE_URL_KEY,
            reason: "at least one base URL is required",
        });
    }

    let connection_attempts = require_u32(root, CONNECTION_ATTEMPTS_KEY)?;
    if connection_attempts == 0 {
        return Err(ConfigError::OutOfRange {
            field: CONNECTION_ATTEMPTS_KEY,
            reason: "at least one attempt is required",
        });
    }

    Ok(ConfigSnapshot {
        base_urls,
        check_path: require_string(root, REST_CHECK_URL_KEY)?,
        notify_path: require_string(root, REST_NOTIFY_URL_KEY)?,
        token: require_string(root, TOKEN_KEY)?,
        ignore_certificate: require_bool(root, IGNORE_CERTIFICATE_KEY)?,
        connection_attempts,
        connection_timeout_ms: require_u32(root, CONNECTION_TIMEOUT_MS_KEY)?,
        system_id: require_string(root, SYSTEM_ID_KEY)?,
        allow_change_by_default: require_bool(root, ALLOW_CHANGE_BY_DEFAULT_KEY)?,
        skipped_account_prefixes: require_strings(root, SKIPPED_ACCOUNT_PREFIXES_KEY)?,
        log_level: require_string(root, LOG_LEVEL_KEY)?,
        password_filter_enabled: require_bool(root, PASSWORD_FILTER_ENABLED_KEY)?,
        valid: true,
    })
}
