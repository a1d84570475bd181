//! Communication with the IdM password filter endpoints.

pub mod check;
pub mod notify;
pub mod request;
pub mod response;
pub mod transport;

pub use self::check::{CheckReport, PolicyCheckEngine, Resolution};
pub use self::notify::{NotificationEngine, NotifyOutcome};
pub use self::request::{new_correlation_id, ChangeRequest, RequestPayload, Secret};
pub use self::response::{interpret, Decision, Interpretation, Rule};
pub use self::transport::{AttemptOutcome, HttpTransport, IdmCall, IdmTransport};

use url::Url;

/// Joins a configured base URL and endpoint path with exactly one slash
/// between them.
pub fn endpoint_url(base: &str, path: &str) -> Result<Url, url::ParseError> {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        Url::parse(base)
    } else {
        Url::parse(&format!("{}/{}", base, path))
    }
}

pub(crate) fn verdict_text(allowed: bool) -> &'static str {
    if allowed {
        "APPROVED"
    } else {
        "DISAPPROVED"
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::transport::{AttemptOutcome, IdmCall, IdmTransport};
    use crate::config::{ConfigLocator, ConfigManager, RefreshOutcome};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays a fixed list of outcomes, then repeats the fallback.
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<AttemptOutcome>>,
        fallback: AttemptOutcome,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub fn new(script: Vec<AttemptOutcome>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback: AttemptOutcome::TransportFailure("script exhausted".into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn repeating(outcome: AttemptOutcome) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(VecDeque::new()),
                fallback: outcome,
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl IdmTransport for ScriptedTransport {
        async fn put(&self, call: &IdmCall<'_>) -> AttemptOutcome {
            assert_eq!(call.token, "test-token");
            self.calls.lock().unwrap().push(call.url.to_string());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    /// A manager holding a freshly loaded configuration with the given
    /// endpoints, attempt count and default.
    pub async fn manager_with(
        urls: &[&str],
        attempts: u32,
        default_allow: bool,
    ) -> Arc<ConfigManager> {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("filter.cfg");
        let content = json!({
            "restBaseUrl": urls,
            "restCheckUrl": "/check",
            "restNotifyUrl": "/notify",
            "token": "test-token",
            "ignoreCertificate": false,
            "connectionAttempts": attempts,
            "connectionTimeoutMs": 1000,
            "systemId": "ad",
            "allowChangeByDefault": default_allow,
            "skippedAccountPrefixes": ["svc_"],
            "logLevel": "DEBUG",
            "passwordFilterEnabled": true
        });
        std::fs::write(&path, content.to_string()).unwrap();

        let manager = ConfigManager::new(ConfigLocator::new("IDM_PWF_TEST_UNSET_VAR", path));
        assert_eq!(manager.refresh_once().await, RefreshOutcome::Published);
        Arc::new(manager)
    }
}
