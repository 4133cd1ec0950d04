//! HTTP control-plane client for a single proxy endpoint. Wraps the four
//! operations every service proxy exposes under `/gremlin/v1`.

use crate::error::{HarnessError, Result};
use crate::rule::Rule;
use crate::testid::TestId;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to one proxy instance's control plane (`host:port`). Stateless
/// beyond the underlying connection pool; safe to clone and share across
/// concurrent pushes.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ProxyClient {
    /// Build a client for `endpoint` (`host:port`, no scheme) with the
    /// default 10s timeout.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Build a client for `endpoint` with an explicit request timeout.
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder is infallible for this configuration");
        Self { http, endpoint: endpoint.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}/gremlin/v1/{}", self.endpoint, path)
    }

    async fn transport<T>(
        &self,
        operation: &'static str,
        fut: impl std::future::Future<Output = std::result::Result<T, reqwest::Error>>,
    ) -> Result<T> {
        fut.await.map_err(|source| HarnessError::Transport {
            endpoint: self.endpoint.clone(),
            operation,
            source: Box::new(source),
        })
    }

    fn check_status(&self, operation: &'static str, rule: Option<&Rule>, status: reqwest::StatusCode) -> Result<()> {
        if status.is_success() {
            return Ok(());
        }
        let (rule_source, rule_dest) = rule
            .map(|r| (r.source.clone(), r.dest.clone()))
            .unwrap_or_default();
        Err(HarnessError::ProxyHttp {
            endpoint: self.endpoint.clone(),
            operation,
            rule_source,
            rule_dest,
            status: status.as_u16(),
        })
    }

    /// `PUT /gremlin/v1/test/<id>`: stamp this proxy with the active test id.
    pub async fn start_test(&self, id: TestId) -> Result<()> {
        let url = self.url(&format!("test/{id}"));
        let resp = self.transport("start_test", self.http.put(&url).send()).await?;
        self.check_status("start_test", None, resp.status())
    }

    /// `DELETE /gremlin/v1/rules`: clear every rule installed on this proxy.
    pub async fn clear_rules(&self) -> Result<()> {
        let url = self.url("rules");
        let resp = self.transport("clear_rules", self.http.delete(&url).send()).await?;
        self.check_status("clear_rules", None, resp.status())
    }

    /// `POST /gremlin/v1/rules/add`: install one rule on this proxy.
    pub async fn add_rule(&self, rule: &Rule) -> Result<()> {
        let url = self.url("rules/add");
        let resp = self
            .transport("add_rule", self.http.post(&url).json(rule).send())
            .await?;
        self.check_status("add_rule", Some(rule), resp.status())
    }

    /// `GET /gremlin/v1/rules/list`: the raw JSON document of rules
    /// currently installed on this proxy.
    pub async fn list_rules(&self) -> Result<Value> {
        let url = self.url("rules/list");
        let resp = self.transport("list_rules", self.http.get(&url).send()).await?;
        self.check_status("list_rules", None, resp.status())?;
        self.transport("list_rules", resp.json()).await
    }
}
