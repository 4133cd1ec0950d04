#![forbid(unsafe_code)]

//! # gremlin-harness
//!
//! A resilience-test harness for microservice meshes: synthesizes fault
//! rules (delays, mangled payloads, aborts) from a service topology and
//! a handful of named scenarios, pushes them to the service proxies that
//! enforce them, and checks resilience properties (bounded retries,
//! circuit-breaker behavior, rate limits, latency bounds) by replaying
//! the structured logs a test run produced.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use gremlin_harness::{GremlinsDocument, Topology};
//! use serde_json::json;
//!
//! # async fn run() -> gremlin_harness::Result<()> {
//! let topology = Topology::from_json(&json!({
//!     "services": [
//!         {"name": "productpage", "service_proxies": ["127.0.0.1:9876"]},
//!         {"name": "reviews", "service_proxies": ["127.0.0.1:9877"]}
//!     ],
//!     "dependencies": {"productpage": ["reviews"]}
//! }))?;
//!
//! let gremlins: GremlinsDocument = serde_json::from_value(json!({
//!     "gremlins": [
//!         {"scenario": "crash_service", "dest": "reviews"}
//!     ]
//! }))?;
//!
//! let test_id = gremlin_harness::recipe::setup_failures(&topology, &gremlins, false).await?;
//! println!("started test {test_id}");
//! # Ok(())
//! # }
//! ```

mod assertion_checker;
mod check;
mod duration_fmt;
mod error;
mod failure_generator;
mod log_query;
mod proxy_client;
pub mod recipe;
mod rule;
mod scenario;
mod testid;
mod topology;

pub use assertion_checker::{AssertionChecker, AssertionResult};
pub use check::Check;
pub use duration_fmt::{format_duration, parse_duration};
pub use error::{HarnessError, Result};
pub use failure_generator::FailureGenerator;
pub use log_query::{AggBucket, LogEvent, LogQuery, LogStore, MessageKind, SearchResult, MAX_QUERY_RESULTS};
pub use proxy_client::ProxyClient;
pub use recipe::{ChecklistDocument, GremlinsDocument};
pub use rule::{AbortFault, DelayFault, Distribution, MangleFault, MessageType, Rule};
pub use scenario::{Scenario, ScenarioExpander};
pub use testid::TestId;
pub use topology::{Service, Topology};

pub mod prelude;
