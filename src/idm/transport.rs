//! The seam between the engines and HTTP.

use super::request::RequestPayload;
use anyhow::{Context, Result};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::debug;

/// Header carrying the shared secret token.
pub const TOKEN_HEADER: &str = "CIDMST";
pub const IDM_CONTENT_TYPE: &str = "application/json";

/// Substrings (lowercase) identifying certificate and TLS channel failures
/// somewhere in an error's source chain.
const SECURITY_FAILURE_MARKERS: &[&str] = &[
    "certificate",
    "unknownissuer",
    "notvalidforname",
    "badsignature",
    "revoked",
    "handshake",
];

/// Result of one network attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// IdM answered. `body` is `None` when it could not be read.
    Response { status: u16, body: Option<String> },
    /// Connection refused, DNS failure, timeout and the like.
    TransportFailure(String),
    /// Certificate or TLS validation failed. A transport failure that can
    /// override the default-allow policy.
    SecurityFailure(String),
}

/// Everything needed to issue one PUT to IdM.
pub struct IdmCall<'a> {
    pub url: &'a str,
    pub token: &'a str,
    pub payload: &'a RequestPayload,
    pub timeout: Duration,
    pub validate_certificates: bool,
}

/// Abstract IdM transport for mocking and switching implementations.
#[async_trait::async_trait]
pub trait IdmTransport: Send + Sync {
    async fn put(&self, call: &IdmCall<'_>) -> AttemptOutcome;
}

/// `reqwest` based transport.
///
/// Certificate validation is a client-level setting, so one client of each
/// kind is kept and picked per call.
pub struct HttpTransport {
    validating: Client,
    lenient: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let user_agent = concat!("IdmPasswordFilter/", env!("CARGO_PKG_VERSION"));
        let validating = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        let lenient = Client::builder()
            .user_agent(user_agent)
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to build HTTP client without certificate validation")?;
        Ok(Self {
            validating,
            lenient,
        })
    }

    fn client(&self, validate_certificates: bool) -> &Client {
        if validate_certificates {
            &self.validating
        } else {
            &self.lenient
        }
    }
}

#[async_trait::async_trait]
impl IdmTransport for HttpTransport {
    async fn put(&self, call: &IdmCall<'_>) -> AttemptOutcome {
        let request = self
            .client(call.validate_certificates)
            .put(call.url)
            .header(TOKEN_HEADER, call.token)
            .header(CONTENT_TYPE, HeaderValue::from_static(IDM_CONTENT_TYPE))
            .timeout(call.timeout)
            .body(call.payload.to_body());

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = match response.text().await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        debug!("Failed to read IdM response body: {}", e);
                        None
                    }
                };
                AttemptOutcome::Response { status, body }
            }
            Err(e) => classify_error(&e),
        }
    }
}

/// Splits request errors into security and plain transport failures.
pub fn classify_error(error: &(dyn StdError + 'static)) -> AttemptOutcome {
    let chain = error_chain(error);
    let lowered = chain.to_lowercase();
    if SECURITY_FAILURE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        AttemptOutcome::SecurityFailure(chain)
    } else {
        AttemptOutcome::TransportFailure(chain)
    }
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}
