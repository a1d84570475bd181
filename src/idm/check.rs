use super::request::ChangeRequest;
use super::response::{interpret, Decision, Rule};
use super::transport::{AttemptOutcome, IdmCall, IdmTransport};
use super::{endpoint_url, verdict_text};
use crate::config::ConfigManager;
use std::sync::Arc;
use tracing::{error, info, warn};

/// How a policy check reached its verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// IdM answered with an approving or denying response.
    Decided { url: String, rule: Rule },
    /// IdM asked for the configured default.
    ConfiguredDefault { url: String, rule: Rule },
    /// No URL resolved and the last one attempted failed TLS validation.
    SecurityFailure { url: String },
    /// No URL resolved; the configured default applies.
    Exhausted,
    /// No configuration has ever been loaded; the change is allowed.
    Uninitialized,
    /// The request body could not be built; the configured default applies.
    PayloadError,
}

/// Verdict of one policy check together with its decision path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub allowed: bool,
    pub resolution: Resolution,
    /// Network attempts made.
    pub attempts: u32,
}

/// Asks IdM whether a new password may be set, failing over across the
/// configured base URLs.
pub struct PolicyCheckEngine {
    config: Arc<ConfigManager>,
    transport: Arc<dyn IdmTransport>,
}

impl PolicyCheckEngine {
    pub fn new(config: Arc<ConfigManager>, transport: Arc<dyn IdmTransport>) -> Self {
        Self { config, transport }
    }

    /// Returns true when the password change may proceed. Never fails;
    /// bounded by base URLs x attempts x timeout.
    pub async fn check_policy(&self, request: &ChangeRequest) -> bool {
        self.check_policy_traced(request).await.allowed
    }

    pub async fn check_policy_traced(&self, request: &ChangeRequest) -> CheckReport {
        info!(
            "Account: {} - Starting password policy validation",
            request.account()
        );
        let report = self.run(request).await;
        info!(
            "Account: {} - Password policy validation completed with the result: {} ({:?}, {} attempt(s))",
            request.account(),
            verdict_text(report.allowed),
            report.resolution,
            report.attempts
        );
        report
    }

    async fn run(&self, request: &ChangeRequest) -> CheckReport {
        let config = self.config.current_snapshot();
        if !config.valid {
            return CheckReport {
                allowed: true,
                resolution: Resolution::Uninitialized,
                attempts: 0,
            };
        }

        let default_allow = config.allow_change_by_default;
        let payload = match request.payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to build the validation request: {}", e);
                return CheckReport {
                    allowed: default_allow,
                    resolution: Resolution::PayloadError,
                    attempts: 0,
                };
            }
        };

        let mut attempts = 0;
        let mut security_failure = false;
        let mut last_url = String::new();

        for base_url in &config.base_urls {
            // The latch only speaks for the URL currently being tried.
            security_failure = false;
            let url = match endpoint_url(base_url, &config.check_path) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    error!("Invalid IdM check URL from base {}: {}", base_url, e);
                    continue;
                }
            };
            last_url.clone_from(&url);

            for _ in 0..config.connection_attempts {
                attempts += 1;
                let call = IdmCall {
                    url: &url,
                    token: &config.token,
                    payload: &payload,
                    timeout: config.connection_timeout(),
                    validate_certificates: config.validate_certificates(),
                };

                match self.transport.put(&call).await {
                    AttemptOutcome::Response { status, body } => {
                        let interpretation = interpret(status, body.as_deref());
                        let rule = interpretation.rule;
                        match interpretation.decision {
                            Decision::Approve | Decision::Deny => {
                                return CheckReport {
                                    allowed: interpretation.decision == Decision::Approve,
                                    resolution: Resolution::Decided { url, rule },
                                    attempts,
                                };
                            }
                            Decision::UseConfiguredDefault => {
                                return CheckReport {
                                    allowed: default_allow,
                                    resolution: Resolution::ConfiguredDefault { url, rule },
                                    attempts,
                                };
                            }
                            Decision::Retry => continue,
                        }
                    }
                    AttemptOutcome::TransportFailure(reason) => {
                        warn!("Validation request to {} failed: {}", url, reason);
                        // The latch tracks the most recent failure on this URL.
                        security_failure = false;
                    }
                    AttemptOutcome::SecurityFailure(reason) => {
                        error!(
                            "Secure connection to {} could not be established: {}",
                            url, reason
                        );
                        security_failure = true;
                    }
                }
            }
        }

        if security_failure {
            CheckReport {
                allowed: false,
                resolution: Resolution::SecurityFailure { url: last_url },
                attempts,
            }
        } else {
            CheckReport {
                allowed: default_allow,
                resolution: Resolution::Exhausted,
                attempts,
            }
        }
    }
}
