//! The assertion vocabulary a checklist document can name. Each
//! variant carries exactly the named arguments its check needs.
//!
//! `check_bulkhead` and `check_num_requests` from the original assertion
//! vocabulary are intentionally absent: both are unreferenced by any
//! checklist in practice and out of scope for this harness.

use serde::Deserialize;

/// One entry under `checks` in a checklist document, tagged by `name`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Check {
    NoProxyErrors,
    BoundedResponseTime {
        source: String,
        dest: String,
        max_latency: String,
    },
    HttpSuccessStatus,
    HttpStatus {
        source: String,
        dest: String,
        status: u16,
        req_id: String,
    },
    /// `retries` is the number of *retries*, not the total request count:
    /// the original request is excluded from the budget (the "+1"
    /// convention).
    BoundedRetries {
        source: String,
        dest: String,
        retries: u64,
        #[serde(default)]
        wait_time: Option<String>,
        #[serde(default)]
        errdelta: Option<String>,
        #[serde(default)]
        by_uri: bool,
    },
    CircuitBreaker {
        source: String,
        dest: String,
        closed_attempts: u64,
        reset_time: String,
        headerprefix: String,
        #[serde(default)]
        halfopen_attempts: Option<u64>,
        #[serde(default)]
        remove_retries: bool,
    },
    /// `num_requests` excludes the original request from the budget, same
    /// "+1" convention as [`Check::BoundedRetries`].
    AtMostRequests {
        source: String,
        dest: String,
        num_requests: u64,
    },
}

impl Check {
    /// The wire name of this check, as it would appear in a checklist
    /// document's `name` field.
    pub fn name(&self) -> &'static str {
        match self {
            Check::NoProxyErrors => "no_proxy_errors",
            Check::BoundedResponseTime { .. } => "bounded_response_time",
            Check::HttpSuccessStatus => "http_success_status",
            Check::HttpStatus { .. } => "http_status",
            Check::BoundedRetries { .. } => "bounded_retries",
            Check::CircuitBreaker { .. } => "circuit_breaker",
            Check::AtMostRequests { .. } => "at_most_requests",
        }
    }
}
