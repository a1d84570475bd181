#![allow(dead_code)]

use idm_password_filter::config::{ConfigLocator, ConfigManager, RefreshOutcome};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const TOKEN: &str = "it-token";

pub fn config_value(urls: &[String], attempts: u32, default_allow: bool) -> Value {
    json!({
        "restBaseUrl": urls,
        "restCheckUrl": "/api/v1/password-filter/validate",
        "restNotifyUrl": "/api/v1/password-filter/change",
        "token": TOKEN,
        "ignoreCertificate": false,
        "connectionAttempts": attempts,
        "connectionTimeoutMs": 2000,
        "systemId": "ad-main",
        "allowChangeByDefault": default_allow,
        "skippedAccountPrefixes": ["svc_"],
        "logLevel": "DEBUG",
        "passwordFilterEnabled": true
    })
}

pub fn locator_for(path: &Path) -> ConfigLocator {
    ConfigLocator::new("IDM_PWF_IT_UNSET_VAR", path)
}

/// Writes the configuration into `dir` and returns a manager that has
/// already loaded it.
pub async fn loaded_manager(dir: &TempDir, config: &Value) -> Arc<ConfigManager> {
    let path = dir.path().join("PasswordFilterConfig.cfg");
    std::fs::write(&path, config.to_string()).unwrap();
    let manager = ConfigManager::new(locator_for(&path));
    assert_eq!(manager.refresh_once().await, RefreshOutcome::Published);
    Arc::new(manager)
}

/// A local URL nothing listens on.
pub fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}
