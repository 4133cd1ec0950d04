//! Replays structured proxy logs against a [`Check`] and reports whether
//! the resilience property it describes held for a test run.
//!
//! These checks never execute a policy — the circuit-breaker replay in
//! particular only infers what state the breaker must have been in from
//! the requests and responses that were logged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::check::Check;
use crate::duration_fmt::parse_duration;
use crate::error::{HarnessError, Result};
use crate::log_query::{LogEvent, LogQuery, LogStore, MessageKind, MAX_QUERY_RESULTS};

/// The outcome of a single named check against a checklist.
#[derive(Debug, Clone)]
pub struct AssertionResult {
    pub name: String,
    pub info: String,
    pub success: bool,
    pub errormsg: String,
}

fn chrono_to_std(d: chrono::Duration) -> Duration {
    d.to_std().unwrap_or(Duration::ZERO)
}

fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

/// Replays logged requests/responses against a [`Check`]'s expectations.
/// All queries are scoped to a single test id.
pub struct AssertionChecker {
    store: Arc<dyn LogStore>,
    test_id: String,
}

impl AssertionChecker {
    pub fn new(store: Arc<dyn LogStore>, test_id: impl Into<String>) -> Self {
        Self { store, test_id: test_id.into() }
    }

    /// Run every check in a checklist. With `fail_fast`, stops and returns
    /// at the first failing check (mirroring `all=False` in the original);
    /// otherwise runs every check and returns every result.
    pub async fn check_all(&self, checks: &[Check], fail_fast: bool) -> Result<Vec<AssertionResult>> {
        let mut results = Vec::with_capacity(checks.len());
        for check in checks {
            let result = self.check(check).await?;
            let failed = !result.success;
            results.push(result);
            if failed && fail_fast {
                break;
            }
        }
        Ok(results)
    }

    /// Run a single check and translate its outcome into an
    /// [`AssertionResult`]. A [`HarnessError::EmptyLogs`] from the query
    /// itself surfaces as a failed (not erroring) result.
    pub async fn check(&self, check: &Check) -> Result<AssertionResult> {
        let name = check.name().to_string();
        let info = format!("{check:?}");

        let outcome = match check {
            Check::NoProxyErrors => self.check_no_proxy_errors().await,
            Check::BoundedResponseTime { source, dest, max_latency } => {
                self.check_bounded_response_time(source, dest, max_latency).await
            }
            Check::HttpSuccessStatus => self.check_http_success_status().await,
            Check::HttpStatus { source, dest, status, req_id } => {
                self.check_http_status(source, dest, *status, req_id).await
            }
            Check::BoundedRetries { source, dest, retries, wait_time, errdelta, by_uri } => {
                self.check_bounded_retries(
                    source,
                    dest,
                    *retries,
                    wait_time.as_deref(),
                    errdelta.as_deref(),
                    *by_uri,
                )
                .await
            }
            Check::CircuitBreaker {
                source,
                dest,
                closed_attempts,
                reset_time,
                headerprefix,
                halfopen_attempts,
                remove_retries,
            } => {
                self.check_circuit_breaker(
                    source,
                    dest,
                    *closed_attempts,
                    reset_time,
                    headerprefix,
                    halfopen_attempts.unwrap_or(1),
                    *remove_retries,
                )
                .await
            }
            Check::AtMostRequests { source, dest, num_requests } => {
                self.check_at_most_requests(source, dest, *num_requests).await
            }
        };

        match outcome {
            Ok((success, errormsg)) => Ok(AssertionResult { name, info, success, errormsg }),
            Err(HarnessError::EmptyLogs) => {
                Ok(AssertionResult { name, info, success: false, errormsg: "No log entries found".to_string() })
            }
            Err(other) => Err(other),
        }
    }

    async fn search(&self, query: LogQuery) -> Result<crate::log_query::SearchResult> {
        let result = self.store.search(&query).await?;
        if !result.is_non_empty() {
            return Err(HarnessError::EmptyLogs);
        }
        Ok(result)
    }

    async fn check_no_proxy_errors(&self) -> Result<(bool, String)> {
        let query = LogQuery::new().term("level", "error").term("testid", self.test_id.clone());
        let result = self.store.search(&query).await?;
        if result.total == 0 {
            Ok((true, String::new()))
        } else {
            Ok((false, format!("{} proxy error log entries found", result.total)))
        }
    }

    async fn check_bounded_response_time(&self, source: &str, dest: &str, max_latency: &str) -> Result<(bool, String)> {
        let max_latency = parse_duration(max_latency).map_err(HarnessError::Input)?;
        let query = LogQuery::new()
            .term("msg", "Response")
            .term("source", source)
            .term("dest", dest)
            .term("testid", self.test_id.clone());
        let result = self.search(query).await?;

        let mut success = true;
        let mut errormsg = String::new();
        for event in &result.hits {
            let Some(duration) = event.duration.as_deref() else { continue };
            let observed = parse_duration(duration).map_err(HarnessError::Input)?;
            if observed > max_latency {
                success = false;
                errormsg = format!(
                    "{dest} did not reply in time for request {}, {}",
                    event.req_id, duration
                );
            }
        }
        Ok((success, errormsg))
    }

    async fn check_http_success_status(&self) -> Result<(bool, String)> {
        let query = LogQuery::new().exists("status").term("testid", self.test_id.clone());
        let result = self.search(query).await?;

        let mut success = true;
        let mut errormsg = String::new();
        for event in &result.hits {
            if event.status != Some(200) {
                success = false;
                errormsg = format!("request {} returned status {:?}, expected 200", event.req_id, event.status);
            }
        }
        Ok((success, errormsg))
    }

    async fn check_http_status(&self, source: &str, dest: &str, status: u16, req_id: &str) -> Result<(bool, String)> {
        let query = LogQuery::new()
            .term("msg", "Response")
            .term("source", source)
            .term("dest", dest)
            .term("reqID", req_id)
            .term("protocol", "http")
            .term("testid", self.test_id.clone());
        let result = self.search(query).await?;

        let mut success = true;
        let mut errormsg = String::new();
        for event in &result.hits {
            if event.status != Some(status) {
                success = false;
                errormsg = format!("request {} returned status {:?}, expected {status}", event.req_id, event.status);
            }
        }
        Ok((success, errormsg))
    }

    async fn check_at_most_requests(&self, source: &str, dest: &str, num_requests: u64) -> Result<(bool, String)> {
        let query = LogQuery::new()
            .term("msg", "Request")
            .term("source", source)
            .term("dest", dest)
            .term("protocol", "http")
            .term("testid", self.test_id.clone())
            .terms_aggregation("byid", "reqID");
        let result = self.search(query).await?;

        for bucket in result.aggregations.get("byid").into_iter().flatten() {
            if bucket.doc_count > num_requests + 1 {
                return Ok((
                    false,
                    format!(
                        "{source} -> {dest} - expected {num_requests} requests, but found {} requests for id {}",
                        bucket.doc_count - 1,
                        bucket.key
                    ),
                ));
            }
        }
        Ok((true, String::new()))
    }

    async fn check_bounded_retries(
        &self,
        source: &str,
        dest: &str,
        retries: u64,
        wait_time: Option<&str>,
        errdelta: Option<&str>,
        by_uri: bool,
    ) -> Result<(bool, String)> {
        let agg_field = if by_uri { "uri" } else { "reqID" };
        let query = LogQuery::new()
            .term("msg", "Request")
            .term("source", source)
            .term("dest", dest)
            .term("testid", self.test_id.clone())
            .terms_aggregation("byid", agg_field);
        let result = self.search(query).await?;

        let buckets = result.aggregations.get("byid").cloned().unwrap_or_default();
        for bucket in &buckets {
            if bucket.doc_count > retries + 1 {
                return Ok((
                    false,
                    format!(
                        "{source} -> {dest} - expected {retries} retries, but found {} retries for request {}",
                        bucket.doc_count - 1,
                        bucket.key
                    ),
                ));
            }
        }

        let Some(wait_time) = wait_time else { return Ok((true, String::new())) };
        let wait_time = parse_duration(wait_time).map_err(HarnessError::Input)?;
        let errdelta = match errdelta {
            Some(s) => parse_duration(s).map_err(HarnessError::Input)?,
            None => Duration::from_millis(10),
        };

        let mut success = true;
        let mut errormsg = String::new();
        for bucket in &buckets {
            let key = bucket_key_as_string(&bucket.key);
            let mut sequence: Vec<&LogEvent> = result
                .hits
                .iter()
                .filter(|e| field_value(e, agg_field) == key)
                .collect();
            sequence.sort_by_key(|e| e.ts);

            for window in sequence.windows(2) {
                let observed = chrono_to_std(window[1].ts - window[0].ts);
                if abs_diff(observed, wait_time) > errdelta {
                    success = false;
                    errormsg = format!(
                        "{source} -> {dest} - expected {wait_time:?}+/-{errdelta:?} spacing for request {key}, but observed {observed:?}"
                    );
                    break;
                }
            }
        }
        Ok((success, errormsg))
    }

    /// Replays a sequence of requests/responses through the closed / open
    /// / half-open state machine and flags the first point where the
    /// logged traffic is inconsistent with the breaker's contract:
    /// requests issued before `reset_time` elapses in the open state.
    #[allow(clippy::too_many_arguments)]
    async fn check_circuit_breaker(
        &self,
        source: &str,
        dest: &str,
        closed_attempts: u64,
        reset_time: &str,
        headerprefix: &str,
        halfopen_attempts: u64,
        remove_retries: bool,
    ) -> Result<(bool, String)> {
        let reset_time = parse_duration(reset_time).map_err(HarnessError::Input)?;
        let query = LogQuery::new()
            .term("source", source)
            .term("dest", dest)
            .prefix("reqID", headerprefix)
            .term("testid", self.test_id.clone())
            .should_term("msg", "Request")
            .should_term("msg", "Response");
        let result = self.search(query).await?;

        let mut sequence: Vec<&LogEvent> = result.hits.iter().filter(|e| e.source == source).collect();
        sequence.sort_by_key(|e| e.ts);

        if remove_retries {
            sequence = collapse_consecutive_retries(sequence);
        }

        let mut state = CircuitState::Closed;
        let mut failures: u64 = 0;
        let mut successes: u64 = 0;
        let mut open_since: Option<chrono::DateTime<chrono::Utc>> = None;

        for event in sequence {
            match state {
                CircuitState::Open => {
                    let since = open_since.expect("open state always carries a timestamp");
                    let spacing = chrono_to_std(event.ts - since);
                    if spacing >= reset_time {
                        state = CircuitState::HalfOpen;
                        open_since = None;
                        failures = 0;
                    } else if event.msg == MessageKind::Request {
                        return Ok((
                            false,
                            format!(
                                "{source} -> {dest} - new request was issued at {spacing:?} before reset_time ({reset_time:?}) expired"
                            ),
                        ));
                    }
                }
                CircuitState::HalfOpen => {
                    let tripped = (event.msg == MessageKind::Response && event.status != Some(200))
                        || (event.msg == MessageKind::Request && event.actions.iter().any(|a| a == "abort"));
                    if tripped {
                        state = CircuitState::Open;
                        open_since = Some(event.ts);
                        successes = 0;
                    } else if event.msg == MessageKind::Response && event.status == Some(200) {
                        successes += 1;
                        if successes > halfopen_attempts {
                            state = CircuitState::Closed;
                            failures = 0;
                            open_since = None;
                        }
                    }
                }
                CircuitState::Closed => {
                    let failed = (event.msg == MessageKind::Response && event.status != Some(200))
                        || (event.msg == MessageKind::Request && !event.actions.is_empty());
                    if failed {
                        failures += 1;
                        if failures > closed_attempts {
                            open_since = Some(event.ts);
                            successes = 0;
                            state = CircuitState::Open;
                        }
                    }
                }
            }
        }

        debug!(?state, "circuit breaker replay finished");
        Ok((true, String::new()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

fn field_value(event: &LogEvent, field: &str) -> String {
    match field {
        "uri" => event.uri.clone().unwrap_or_default(),
        _ => event.req_id.clone(),
    }
}

fn bucket_key_as_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Collapses runs of consecutive events sharing a `reqID`, keeping only
/// the last of each run: treats a proxy's own internal retries as a
/// single logical attempt for the purposes of the breaker replay.
fn collapse_consecutive_retries<'a>(sequence: Vec<&'a LogEvent>) -> Vec<&'a LogEvent> {
    let mut out = Vec::with_capacity(sequence.len());
    for (i, event) in sequence.iter().enumerate() {
        let is_last = i == sequence.len() - 1;
        if is_last || sequence[i].req_id != sequence[i + 1].req_id {
            out.push(*event);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    struct FakeStore {
        responses: Mutex<Vec<crate::log_query::SearchResult>>,
    }

    #[async_trait]
    impl LogStore for FakeStore {
        async fn search(&self, _query: &LogQuery) -> Result<crate::log_query::SearchResult> {
            let mut responses = self.responses.lock().unwrap();
            Ok(responses.remove(0))
        }
    }

    fn ts(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    fn event(ts_secs: i64, msg: MessageKind, status: Option<u16>, req_id: &str) -> LogEvent {
        LogEvent {
            ts: ts(ts_secs),
            testid: "t".into(),
            source: "productpage".into(),
            dest: "reviews".into(),
            msg,
            req_id: req_id.into(),
            protocol: Some("http".into()),
            status,
            duration: Some("10ms".into()),
            actions: Vec::new(),
            uri: None,
            level: None,
            errmsg: None,
        }
    }

    #[tokio::test]
    async fn no_proxy_errors_passes_when_total_is_zero() {
        let store = Arc::new(FakeStore {
            responses: Mutex::new(vec![crate::log_query::SearchResult { total: 0, hits: vec![], aggregations: HashMap::new() }]),
        });
        let checker = AssertionChecker::new(store, "test-id");
        let result = checker.check(&Check::NoProxyErrors).await.unwrap();
        assert!(result.success);
    }

    struct CapturingStore {
        captured: Mutex<Option<LogQuery>>,
        response: crate::log_query::SearchResult,
    }

    #[async_trait]
    impl LogStore for CapturingStore {
        async fn search(&self, query: &LogQuery) -> Result<crate::log_query::SearchResult> {
            *self.captured.lock().unwrap() = Some(query.clone());
            Ok(self.response.clone())
        }
    }

    fn body_is_scoped_to_test_id(query: &LogQuery, test_id: &str) -> bool {
        let body = query.to_body(MAX_QUERY_RESULTS);
        let body = body.to_string();
        body.contains(test_id)
    }

    #[tokio::test]
    async fn no_proxy_errors_scopes_its_query_to_the_current_test_id() {
        let store = Arc::new(CapturingStore {
            captured: Mutex::new(None),
            response: crate::log_query::SearchResult { total: 0, hits: vec![], aggregations: HashMap::new() },
        });
        let checker = AssertionChecker::new(store.clone(), "test-id");
        checker.check(&Check::NoProxyErrors).await.unwrap();
        let query = store.captured.lock().unwrap().clone().unwrap();
        assert!(body_is_scoped_to_test_id(&query, "test-id"));
    }

    #[tokio::test]
    async fn http_success_status_scopes_its_query_to_the_current_test_id() {
        let store = Arc::new(CapturingStore {
            captured: Mutex::new(None),
            response: crate::log_query::SearchResult { total: 0, hits: vec![], aggregations: HashMap::new() },
        });
        let checker = AssertionChecker::new(store.clone(), "test-id");
        let _ = checker.check(&Check::HttpSuccessStatus).await;
        let query = store.captured.lock().unwrap().clone().unwrap();
        assert!(body_is_scoped_to_test_id(&query, "test-id"));
    }

    #[tokio::test]
    async fn empty_logs_surfaces_as_a_failed_result_not_an_error() {
        let store = Arc::new(FakeStore {
            responses: Mutex::new(vec![crate::log_query::SearchResult::default()]),
        });
        let checker = AssertionChecker::new(store, "test-id");
        let result = checker
            .check(&Check::BoundedResponseTime { source: "a".into(), dest: "b".into(), max_latency: "1s".into() })
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.errormsg, "No log entries found");
    }

    #[tokio::test]
    async fn bounded_response_time_flags_overlong_replies() {
        let mut hits = vec![event(0, MessageKind::Response, Some(200), "r1")];
        hits[0].duration = Some("500ms".into());
        let store = Arc::new(FakeStore {
            responses: Mutex::new(vec![crate::log_query::SearchResult { total: 1, hits, aggregations: HashMap::new() }]),
        });
        let checker = AssertionChecker::new(store, "test-id");
        let result = checker
            .check(&Check::BoundedResponseTime { source: "a".into(), dest: "b".into(), max_latency: "100ms".into() })
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn at_most_requests_allows_exactly_the_plus_one_budget() {
        let hits = vec![
            event(0, MessageKind::Request, None, "r1"),
            event(1, MessageKind::Request, None, "r1"),
        ];
        let mut aggs = HashMap::new();
        aggs.insert(
            "byid".to_string(),
            vec![crate::log_query::AggBucket { key: Value::String("r1".into()), doc_count: 2 }],
        );
        let store = Arc::new(FakeStore {
            responses: Mutex::new(vec![crate::log_query::SearchResult { total: 2, hits, aggregations: aggs }]),
        });
        let checker = AssertionChecker::new(store, "test-id");
        let result = checker
            .check(&Check::AtMostRequests { source: "a".into(), dest: "b".into(), num_requests: 1 })
            .await
            .unwrap();
        assert!(result.success, "1 retry + original request should fit a budget of 1");
    }

    #[tokio::test]
    async fn circuit_breaker_flags_a_request_issued_while_still_open() {
        let hits = vec![
            event(0, MessageKind::Response, Some(500), "r1"),
            event(1, MessageKind::Response, Some(500), "r2"),
            event(2, MessageKind::Request, None, "r3"),
        ];
        let store = Arc::new(FakeStore {
            responses: Mutex::new(vec![crate::log_query::SearchResult { total: 3, hits, aggregations: HashMap::new() }]),
        });
        let checker = AssertionChecker::new(store, "test-id");
        let result = checker
            .check(&Check::CircuitBreaker {
                source: "productpage".into(),
                dest: "reviews".into(),
                closed_attempts: 1,
                reset_time: "10s".into(),
                headerprefix: "gremlin".into(),
                halfopen_attempts: None,
                remove_retries: false,
            })
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn circuit_breaker_recovers_through_half_open_to_closed() {
        let hits = vec![
            event(0, MessageKind::Response, Some(500), "r1"),
            event(1, MessageKind::Response, Some(500), "r2"),
            // past reset_time (10s): open -> half-open, then two clean responses close it
            // (successes must exceed halfopen_attempts, not just reach it).
            event(12, MessageKind::Request, None, "r3"),
            event(13, MessageKind::Response, Some(200), "r3"),
            event(14, MessageKind::Request, None, "r4"),
            event(15, MessageKind::Response, Some(200), "r4"),
        ];
        let store = Arc::new(FakeStore {
            responses: Mutex::new(vec![crate::log_query::SearchResult { total: 6, hits, aggregations: HashMap::new() }]),
        });
        let checker = AssertionChecker::new(store, "test-id");
        let result = checker
            .check(&Check::CircuitBreaker {
                source: "productpage".into(),
                dest: "reviews".into(),
                closed_attempts: 1,
                reset_time: "10s".into(),
                headerprefix: "gremlin".into(),
                halfopen_attempts: Some(1),
                remove_retries: false,
            })
            .await
            .unwrap();
        assert!(result.success, "{result:?}");
    }

    #[tokio::test]
    async fn circuit_breaker_tolerates_a_response_arriving_before_reset_time() {
        // A Response arriving while open and before reset_time elapses is not a
        // violation: only a Request issued too early trips the assertion.
        let hits = vec![
            event(0, MessageKind::Response, Some(500), "r1"),
            event(1, MessageKind::Response, Some(500), "r2"),
            event(2, MessageKind::Response, Some(500), "r3"),
        ];
        let store = Arc::new(FakeStore {
            responses: Mutex::new(vec![crate::log_query::SearchResult { total: 3, hits, aggregations: HashMap::new() }]),
        });
        let checker = AssertionChecker::new(store, "test-id");
        let result = checker
            .check(&Check::CircuitBreaker {
                source: "productpage".into(),
                dest: "reviews".into(),
                closed_attempts: 1,
                reset_time: "10s".into(),
                headerprefix: "gremlin".into(),
                halfopen_attempts: None,
                remove_retries: false,
            })
            .await
            .unwrap();
        assert!(result.success, "{result:?}");
    }

    #[tokio::test]
    async fn circuit_breaker_open_to_half_open_transition_is_not_request_specific() {
        // Matches the original SDK's replay exactly: once reset_time has
        // elapsed, ANY next logged event (not just a Request) advances the
        // breaker out of the open state.
        let hits = vec![
            event(0, MessageKind::Response, Some(500), "r1"),
            event(1, MessageKind::Response, Some(500), "r2"),
            event(12, MessageKind::Response, Some(200), "r3"),
        ];
        let store = Arc::new(FakeStore {
            responses: Mutex::new(vec![crate::log_query::SearchResult { total: 3, hits, aggregations: HashMap::new() }]),
        });
        let checker = AssertionChecker::new(store, "test-id");
        let result = checker
            .check(&Check::CircuitBreaker {
                source: "productpage".into(),
                dest: "reviews".into(),
                closed_attempts: 1,
                reset_time: "10s".into(),
                headerprefix: "gremlin".into(),
                halfopen_attempts: None,
                remove_retries: false,
            })
            .await
            .unwrap();
        assert!(result.success, "{result:?}");
    }

    #[test]
    fn collapse_consecutive_retries_keeps_only_the_last_of_a_run() {
        let e1 = event(0, MessageKind::Request, None, "r1");
        let e2 = event(1, MessageKind::Request, None, "r1");
        let e3 = event(2, MessageKind::Request, None, "r2");
        let collapsed = collapse_consecutive_retries(vec![&e1, &e2, &e3]);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].req_id, "r1");
        assert_eq!(collapsed[1].req_id, "r2");
    }
}
