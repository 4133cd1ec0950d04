//! Ready-to-use gremlin recipes ("cookbook") for gremlin-harness.
//! Each function returns the `(scenarios, checks)` pair you hand to a
//! recipe orchestrator: the gremlins to install before driving traffic,
//! and the checklist to run once that traffic has run.
//!
//! **Ladder:**
//! - Simple: [`crash_drill`], [`overload_drill`]
//! - Intermediate: [`latency_budget_drill`], [`partition_drill`]
//! - Advanced: [`circuit_breaker_drill`]
//! - Starter pack: [`starter_pack`]

use gremlin_harness::{Check, Scenario};

/// `dest` goes dark for every caller. Verify the caller retries within a
/// bound instead of hammering a hard-down dependency indefinitely.
pub fn crash_drill(source: impl Into<String>, dest: impl Into<String>, retries: u64) -> (Vec<Scenario>, Vec<Check>) {
    let source = source.into();
    let dest = dest.into();
    (
        vec![Scenario::CrashService { dest: dest.clone(), abortprobability: None, errorcode: None }],
        vec![Check::BoundedRetries { source, dest, retries, wait_time: None, errdelta: None, by_uri: false }],
    )
}

/// Half of `dest`'s traffic is delayed, half aborted with 503 — the
/// default `overload_service` shape. Verify callers stay within a latency
/// budget instead of piling retries onto an already-overloaded peer.
pub fn overload_drill(
    source: impl Into<String>,
    dest: impl Into<String>,
    max_latency: impl Into<String>,
) -> (Vec<Scenario>, Vec<Check>) {
    let dest = dest.into();
    (
        vec![Scenario::OverloadService {
            dest: dest.clone(),
            delayprobability: None,
            delaytime: None,
            abortprobability: None,
            errorcode: None,
        }],
        vec![Check::BoundedResponseTime { source: source.into(), dest, max_latency: max_latency.into() }],
    )
}

/// Inject a fixed response delay on one edge and verify callers stay
/// within `max_latency`.
pub fn latency_budget_drill(
    source: impl Into<String>,
    dest: impl Into<String>,
    delayprobability: f64,
    delaytime: impl Into<String>,
    max_latency: impl Into<String>,
) -> (Vec<Scenario>, Vec<Check>) {
    let source = source.into();
    let dest = dest.into();
    (
        vec![Scenario::DelayResponses {
            source: source.clone(),
            dest: dest.clone(),
            headerpattern: String::new(),
            bodypattern: String::new(),
            delayprobability,
            delaytime: delaytime.into(),
        }],
        vec![Check::BoundedResponseTime { source, dest, max_latency: max_latency.into() }],
    )
}

/// Sever one edge in both directions at independent probabilities and
/// verify neither side logs a proxy-level error it shouldn't.
pub fn partition_drill(
    source: impl Into<String>,
    dest: impl Into<String>,
    srcprobability: f64,
    dstprobability: f64,
) -> (Vec<Scenario>, Vec<Check>) {
    (
        vec![Scenario::PartitionServices {
            source: source.into(),
            dest: dest.into(),
            srcprobability: Some(srcprobability),
            dstprobability: Some(dstprobability),
            errorcode: None,
        }],
        vec![Check::NoProxyErrors],
    )
}

/// Crash `dest` and verify the caller's breaker trips and recovers on the
/// schedule `reset_time` implies: no request sneaks through while open.
pub fn circuit_breaker_drill(
    source: impl Into<String>,
    dest: impl Into<String>,
    closed_attempts: u64,
    reset_time: impl Into<String>,
    headerprefix: impl Into<String>,
) -> (Vec<Scenario>, Vec<Check>) {
    let source = source.into();
    let dest = dest.into();
    (
        vec![Scenario::CrashService { dest: dest.clone(), abortprobability: None, errorcode: None }],
        vec![Check::CircuitBreaker {
            source,
            dest,
            closed_attempts,
            reset_time: reset_time.into(),
            headerprefix: headerprefix.into(),
            halfopen_attempts: None,
            remove_retries: false,
        }],
    )
}

/// Low-effort default recipe for a first resilience pass on one edge:
/// crash the dependency, bound the caller's retries, and confirm its
/// breaker recovers afterward. Good starting point before hand-tuning
/// individual drills.
pub fn starter_pack(
    source: impl Into<String>,
    dest: impl Into<String>,
    retries: u64,
    reset_time: impl Into<String>,
    headerprefix: impl Into<String>,
) -> (Vec<Scenario>, Vec<Check>) {
    let source = source.into();
    let dest = dest.into();
    let (scenarios, mut checks) = crash_drill(source.clone(), dest.clone(), retries);
    let (_, breaker_checks) = circuit_breaker_drill(source, dest, retries, reset_time, headerprefix);
    checks.extend(breaker_checks);
    (scenarios, checks)
}
