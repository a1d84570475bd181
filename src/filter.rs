//! Host-facing password filter operations.

use crate::config::{ConfigManager, ConfigWatcher};
use crate::idm::{
    new_correlation_id, ChangeRequest, IdmTransport, NotificationEngine, PolicyCheckEngine,
    Secret,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Instrument};

/// The three operations a password-change host invokes: initialization,
/// validation before a change, and notification after it.
pub struct PasswordFilter {
    config: Arc<ConfigManager>,
    checker: PolicyCheckEngine,
    notifier: NotificationEngine,
}

impl PasswordFilter {
    pub fn new(config: Arc<ConfigManager>, transport: Arc<dyn IdmTransport>) -> Self {
        Self {
            checker: PolicyCheckEngine::new(config.clone(), transport.clone()),
            notifier: NotificationEngine::new(config.clone(), transport),
            config,
        }
    }

    /// Loads the configuration once and starts watching it for changes.
    pub async fn start(
        config: Arc<ConfigManager>,
        transport: Arc<dyn IdmTransport>,
        check_period: Duration,
    ) -> (Self, ConfigWatcher) {
        config.refresh_once().await;
        if !config.is_initialized() {
            info!("Password filter is not configured yet; all changes are allowed until it is");
        }
        let watcher = ConfigWatcher::spawn(config.clone(), check_period);
        (Self::new(config, transport), watcher)
    }

    pub fn config(&self) -> &Arc<ConfigManager> {
        &self.config
    }

    /// Always succeeds: a configuration problem is fixed at runtime, so the
    /// host must not refuse to load the filter because of it.
    pub fn initialize(&self) -> bool {
        debug!("Password filter initialized");
        true
    }

    /// Validates a new password with IdM. Returns true when the change may
    /// proceed.
    pub async fn should_allow_change(&self, account: &str, password: Secret) -> bool {
        let correlation_id = new_correlation_id();
        let span = tracing::info_span!("password_change", session = %correlation_id);

        async move {
            debug!("Password policy validation requested");
            let config = self.config.current_snapshot();
            if !config.valid || !config.password_filter_enabled {
                debug!("Password filter is disabled or not properly configured");
                return true;
            }
            if config.is_skipped_account(account) {
                debug!(
                    "Account starts with a reserved prefix; the change is allowed without validation"
                );
                return true;
            }

            let request =
                ChangeRequest::new(account, password, config.system_id.as_str(), correlation_id);
            self.checker.check_policy(&request).await
        }
        .instrument(span)
        .await
    }

    /// Informs IdM that the password was changed. Never fails.
    pub async fn notify_changed(&self, account: &str, password: Secret) {
        let correlation_id = new_correlation_id();
        let span = tracing::info_span!("password_change", session = %correlation_id);

        async move {
            debug!("Password change notification requested");
            let config = self.config.current_snapshot();
            if !config.valid || !config.password_filter_enabled {
                debug!("Password filter is disabled or not properly configured");
                return;
            }
            if config.is_skipped_account(account) {
                debug!("Account starts with a reserved prefix; IdM notification is skipped");
                return;
            }

            let request =
                ChangeRequest::new(account, password, config.system_id.as_str(), correlation_id);
            self.notifier.notify(&request).await;
        }
        .instrument(span)
        .await
    }
}
