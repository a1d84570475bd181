use super::endpoint_url;
use super::request::ChangeRequest;
use super::transport::{AttemptOutcome, IdmCall, IdmTransport};
use crate::config::ConfigManager;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// IdM answered; the status is whatever it returned.
    Delivered { url: String, status: u16 },
    /// Every attempt on every URL failed without an answer.
    Exhausted { attempts: u32 },
    /// No configuration loaded or the request body could not be built.
    Skipped,
}

/// Tells IdM that a password change went through. Best effort.
pub struct NotificationEngine {
    config: Arc<ConfigManager>,
    transport: Arc<dyn IdmTransport>,
}

impl NotificationEngine {
    pub fn new(config: Arc<ConfigManager>, transport: Arc<dyn IdmTransport>) -> Self {
        Self { config, transport }
    }

    pub async fn notify(&self, request: &ChangeRequest) {
        self.notify_traced(request).await;
    }

    pub async fn notify_traced(&self, request: &ChangeRequest) -> NotifyOutcome {
        let config = self.config.current_snapshot();
        if !config.valid {
            info!(
                "Account: {} - Configuration not loaded, IdM notification skipped",
                request.account()
            );
            return NotifyOutcome::Skipped;
        }

        info!(
            "Account: {} - Notifying IdM about password change",
            request.account()
        );
        let payload = match request.payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to build the notification request: {}", e);
                return NotifyOutcome::Skipped;
            }
        };

        let mut attempts = 0;
        for base_url in &config.base_urls {
            let url = match endpoint_url(base_url, &config.notify_path) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    error!("Invalid IdM notify URL from base {}: {}", base_url, e);
                    continue;
                }
            };

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
                    AttemptOutcome::Response { status, .. } => {
                        if status == 200 {
                            info!(
                                "Account: {} - IdM notification is successful",
                                request.account()
                            );
                        } else {
                            warn!(
                                "Account: {} - IdM notification response returned with the http status: {}",
                                request.account(),
                                status
                            );
                        }
                        return NotifyOutcome::Delivered { url, status };
                    }
                    AttemptOutcome::TransportFailure(reason)
                    | AttemptOutcome::SecurityFailure(reason) => {
                        warn!("Notification request to {} failed: {}", url, reason);
                    }
                }
            }
        }

        error!(
            "Account: {} - IdM could not be notified about the password change after {} attempt(s)",
            request.account(),
            attempts
        );
        NotifyOutcome::Exhausted { attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idm::testing::{manager_with, ScriptedTransport};
    use crate::idm::Secret;

    fn request() -> ChangeRequest {
        ChangeRequest::new("bob", Secret::new("N3w-Pass".into()), "ad", "0000000002")
    }

    fn refused() -> AttemptOutcome {
        AttemptOutcome::TransportFailure("connection refused".into())
    }

    async fn engine(
        urls: &[&str],
        attempts: u32,
        transport: Arc<ScriptedTransport>,
    ) -> NotificationEngine {
        NotificationEngine::new(manager_with(urls, attempts, true).await, transport)
    }

    #[tokio::test]
    async fn test_any_response_ends_the_call() {
        let transport = ScriptedTransport::repeating(AttemptOutcome::Response {
            status: 500,
            body: None,
        });
        let engine = engine(&["http://a", "http://b"], 3, transport.clone()).await;
        let outcome = engine.notify_traced(&request()).await;
        assert_eq!(
            outcome,
            NotifyOutcome::Delivered {
                url: "http://a/notify".into(),
                status: 500
            }
        );
        assert_eq!(transport.calls(), vec!["http://a/notify"]);
    }

    #[tokio::test]
    async fn test_transport_failures_fail_over() {
        let transport = ScriptedTransport::new(vec![
            refused(),
            AttemptOutcome::SecurityFailure("bad certificate".into()),
            AttemptOutcome::Response {
                status: 200,
                body: None,
            },
        ]);
        let engine = engine(&["http://a", "http://b"], 2, transport.clone()).await;
        let outcome = engine.notify_traced(&request()).await;
        assert_eq!(
            outcome,
            NotifyOutcome::Delivered {
                url: "http://b/notify".into(),
                status: 200
            }
        );
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_silent() {
        let transport = ScriptedTransport::repeating(refused());
        let engine = engine(&["http://a", "http://b"], 2, transport.clone()).await;
        assert_eq!(
            engine.notify_traced(&request()).await,
            NotifyOutcome::Exhausted { attempts: 4 }
        );
        // The public entry point just returns.
        engine.notify(&request()).await;
        assert_eq!(transport.calls().len(), 8);
    }
}
