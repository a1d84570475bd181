//! Outgoing request content and ownership of the password secret.

use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use zeroize::Zeroizing;

/// Protocol version reported to IdM with every request.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

// Room for keys, quotes and the version on top of the escaped field values.
const PAYLOAD_OVERHEAD: usize = 128;
// Worst case JSON escaping of one byte (`\u00XX`).
const MAX_ESCAPE_FACTOR: usize = 6;

/// A password held in memory that is overwritten with zeros when dropped.
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: String) -> Self {
        Self(Zeroizing::new(value))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Random identifier tying together the log lines of one password change
/// on both sides (it is sent to IdM as `logIdentifier`).
pub fn new_correlation_id() -> String {
    format!("{:010}", rand::random::<u32>())
}

/// One pending or completed password change.
///
/// Owns the password; its storage is scrubbed when the request is dropped,
/// whichever way the caller leaves.
#[derive(Debug)]
pub struct ChangeRequest {
    account: String,
    password: Secret,
    system_id: String,
    correlation_id: String,
}

impl ChangeRequest {
    pub fn new(
        account: impl Into<String>,
        password: Secret,
        system_id: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            password,
            system_id: system_id.into(),
            correlation_id: correlation_id.into(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Serializes the request body sent to IdM.
    pub fn payload(&self) -> serde_json::Result<RequestPayload> {
        let body = RequestBody {
            username: &self.account,
            password: self.password.expose(),
            resource: &self.system_id,
            log_identifier: &self.correlation_id,
            version: PROTOCOL_VERSION,
        };

        // Sized up front so the buffer never reallocates: a reallocation
        // would free a partial copy of the password without scrubbing it.
        let escaped = MAX_ESCAPE_FACTOR
            * (self.account.len()
                + self.password.len()
                + self.system_id.len()
                + self.correlation_id.len()
                + PROTOCOL_VERSION.len());
        let mut buf = Zeroizing::new(Vec::with_capacity(PAYLOAD_OVERHEAD + escaped));
        serde_json::to_writer(&mut *buf, &body)?;
        Ok(RequestPayload(buf))
    }
}

#[derive(Serialize)]
struct RequestBody<'a> {
    username: &'a str,
    password: &'a str,
    resource: &'a str,
    #[serde(rename = "logIdentifier")]
    log_identifier: &'a str,
    version: &'a str,
}

/// Serialized JSON body. Contains the password, so it is scrubbed on drop
/// like the [`Secret`] it was built from.
pub struct RequestPayload(Zeroizing<Vec<u8>>);

impl RequestPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// A copy of the body for the HTTP client. The copy is scrubbed when
    /// the client drops its last reference to it.
    pub fn to_body(&self) -> Bytes {
        Bytes::from_owner(ScrubbedBody(Zeroizing::new(self.0.to_vec())))
    }
}

struct ScrubbedBody(Zeroizing<Vec<u8>>);

impl AsRef<[u8]> for ScrubbedBody {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RequestPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestPayload({} bytes, [REDACTED])", self.0.len())
    }
}
