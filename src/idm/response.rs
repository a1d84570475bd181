//! Interpretation of IdM responses to a policy check.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

const POLICY_VALIDATION_FAILED: &[&str] = &["PASSWORD_DOES_NOT_MEET_POLICY", "POLICY_FAILED"];
const ENTITY_NOT_FOUND: &[&str] = &[
    "PASSWORD_FILTER_SYSTEM_NOT_FOUND",
    "PASSWORD_FILTER_IDENTITY_NOT_FOUND",
    "PASSWORD_FILTER_DEFINITION_NOT_FOUND",
    "SYSTEM_NOT_FOUND",
    "IDENTITY_NOT_FOUND",
    "DEFINITION_NOT_FOUND",
];

const STATUS_OK: u16 = 200;
const STATUS_BAD_REQUEST: u16 = 400;
const STATUS_NOT_FOUND: u16 = 404;
const STATUS_REQUEST_TIMEOUT: u16 = 408;
const STATUS_LOCKED: u16 = 423;
const STATUS_GATEWAY_TIMEOUT: u16 = 504;

/// What the check engine should do with one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny,
    UseConfiguredDefault,
    Retry,
}

/// The row of the decision table that produced a [`Decision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// 200: the password meets the policies.
    Passed,
    /// 423: password filtering is switched off on the IdM side.
    FilterDisabledInIdm,
    /// 400 with the policy-violation status.
    PolicyViolation,
    /// 404 with a missing system, identity or definition status.
    EntityMissing,
    /// 408 or 504.
    Timeout,
    /// Anything else, including 400/404 without a recognized status.
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interpretation {
    pub decision: Decision,
    pub rule: Rule,
}

impl Interpretation {
    fn new(decision: Decision, rule: Rule) -> Self {
        Self { decision, rule }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "_errors")]
    errors: Option<Vec<ErrorEntry>>,
    #[serde(rename = "errors")]
    plain_errors: Option<Vec<ErrorEntry>>,
}

impl ErrorBody {
    fn first(self) -> Option<ErrorEntry> {
        self.errors.or(self.plain_errors)?.into_iter().next()
    }
}

/// One IdM error. Entries usually carry both the status enum and the
/// numeric status code; only string values can name a status.
#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(rename = "statusEnum")]
    status_enum: Option<Value>,
    #[serde(rename = "statusCode")]
    status_code: Option<Value>,
}

impl ErrorEntry {
    fn status(self) -> Option<String> {
        text(self.status_enum).or_else(|| text(self.status_code))
    }
}

fn text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// Extracts the IdM status enum from an error body.
///
/// Returns `None` for an absent or malformed body, a missing or empty
/// error array, or a first error without a status string; all of these
/// count as "no structured content".
pub fn parse_status_enum(body: Option<&str>) -> Option<String> {
    let body = body?.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.first()?.status(),
        Err(e) => {
            debug!("Response body carries no IdM error content: {}", e);
            None
        }
    }
}

/// Maps a response to a decision. First matching row wins.
pub fn interpret(status: u16, body: Option<&str>) -> Interpretation {
    let status_enum = parse_status_enum(body);
    let status_enum = status_enum.as_deref();

    match status {
        STATUS_OK => {
            info!("Password policy validation passed");
            Interpretation::new(Decision::Approve, Rule::Passed)
        }
        STATUS_LOCKED => {
            info!("Password filter is disabled in IdM");
            Interpretation::new(Decision::Approve, Rule::FilterDisabledInIdm)
        }
        STATUS_BAD_REQUEST
            if status_enum.is_some_and(|s| POLICY_VALIDATION_FAILED.contains(&s)) =>
        {
            info!("Password does not meet password policies");
            Interpretation::new(Decision::Deny, Rule::PolicyViolation)
        }
        STATUS_NOT_FOUND if status_enum.is_some_and(|s| ENTITY_NOT_FOUND.contains(&s)) => {
            info!(
                "Entities required for validation are missing in IdM: {}",
                status_enum.unwrap_or_default()
            );
            Interpretation::new(Decision::Approve, Rule::EntityMissing)
        }
        STATUS_REQUEST_TIMEOUT | STATUS_GATEWAY_TIMEOUT => {
            info!("IdM answered with a timeout status {}", status);
            Interpretation::new(Decision::Retry, Rule::Timeout)
        }
        _ => {
            info!(
                "Unrecognized IdM response: http status {} and status enum {}",
                status,
                status_enum.unwrap_or("<none>")
            );
            Interpretation::new(Decision::Deny, Rule::Unrecognized)
        }
    }
}
