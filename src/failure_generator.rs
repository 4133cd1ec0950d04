//! Drives a [`Topology`]'s proxies through a test lifecycle: start a test,
//! queue rules, push them, list what's installed.

use crate::error::Result;
use crate::proxy_client::ProxyClient;
use crate::rule::Rule;
use crate::testid::TestId;
use crate::topology::Topology;
use futures::future::join_all;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Owns the pending rule queue and the active [`TestId`] for one test run
/// against a [`Topology`]. Mirrors the original SDK's `FailureGenerator`:
/// rules accumulate with [`Self::add_rules`] and are only sent to proxies
/// on [`Self::push`].
pub struct FailureGenerator<'a> {
    topology: &'a Topology,
    test_id: Option<TestId>,
    queue: Vec<Rule>,
}

impl<'a> FailureGenerator<'a> {
    pub fn new(topology: &'a Topology) -> Self {
        Self { topology, test_id: None, queue: Vec::new() }
    }

    /// The active test id, if [`Self::start_new_test`] has run.
    pub fn test_id(&self) -> Option<TestId> {
        self.test_id
    }

    /// Generate a fresh [`TestId`] and stamp every proxy in the topology
    /// with it. Test-id PUTs proceed service by service in topology
    /// insertion order; within one service, every endpoint is
    /// contacted concurrently.
    pub async fn start_new_test(&mut self) -> Result<TestId> {
        let id = TestId::generate();
        debug!(test_id = %id, "starting new test");
        for service in self.topology.services().map(str::to_string).collect::<Vec<_>>() {
            let endpoints = self.topology.endpoints(&service).to_vec();
            let attempts = endpoints.into_iter().map(|endpoint| async move {
                ProxyClient::new(endpoint).start_test(id).await
            });
            for result in join_all(attempts).await {
                result?;
            }
        }
        self.test_id = Some(id);
        Ok(id)
    }

    /// Queue rules for later push. Does not contact any proxy.
    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = Rule>) {
        self.queue.extend(rules);
    }

    /// Clear the pending queue and delete every rule installed on every
    /// proxy in the topology. Failures to clear an individual proxy are
    /// logged and do not abort the sweep, matching the original's
    /// "best-effort" clear semantics.
    pub async fn clear_all(&mut self) -> Result<()> {
        self.queue.clear();
        for service in self.topology.services().map(str::to_string).collect::<Vec<_>>() {
            let endpoints = self.topology.endpoints(&service).to_vec();
            let attempts = endpoints.into_iter().map(|endpoint| async move {
                let result = ProxyClient::new(endpoint.clone()).clear_rules().await;
                (endpoint, result)
            });
            for (endpoint, result) in join_all(attempts).await {
                if let Err(err) = result {
                    warn!(%service, %endpoint, error = %err, "failed to clear rules");
                }
            }
        }
        Ok(())
    }

    /// Push every queued rule to the proxies on its `source` service. Every
    /// endpoint of one rule is contacted concurrently, and all of them
    /// complete before the next rule is pushed. `continue_on_error`
    /// only covers transport failures (an unreachable proxy): if set, those
    /// are logged and the sweep keeps going. A non-2xx from a reachable
    /// proxy is a [`crate::error::HarnessError::ProxyHttp`] and always
    /// aborts the push immediately, regardless of `continue_on_error` — it
    /// is never retried and never swallowed. Does not clear the queue.
    pub async fn push(&self, continue_on_error: bool) -> Result<()> {
        for rule in &self.queue {
            let endpoints = self.topology.endpoints(&rule.source).to_vec();
            let attempts = endpoints.into_iter().map(|endpoint| async move {
                let result = ProxyClient::new(endpoint.clone()).add_rule(rule).await;
                (endpoint, result)
            });
            for (endpoint, result) in join_all(attempts).await {
                if let Err(err) = result {
                    if continue_on_error && err.is_transport() {
                        warn!(%endpoint, source = %rule.source, dest = %rule.dest, error = %err, "failed to add rule, continuing");
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// List rules installed for `service`, or every service if `None`.
    /// An unknown service name yields an empty map rather than an error.
    pub async fn list_rules(
        &self,
        service: Option<&str>,
    ) -> HashMap<String, HashMap<String, serde_json::Value>> {
        let services: Vec<String> = match service {
            Some(name) if self.topology.has_service(name) => vec![name.to_string()],
            Some(_) => Vec::new(),
            None => self.topology.services().map(str::to_string).collect(),
        };

        let mut out = HashMap::with_capacity(services.len());
        for service in services {
            let endpoints = self.topology.endpoints(&service).to_vec();
            let attempts = endpoints.into_iter().map(|endpoint| async move {
                let result = ProxyClient::new(endpoint.clone()).list_rules().await;
                (endpoint, result)
            });

            let mut per_instance = HashMap::new();
            for (endpoint, result) in join_all(attempts).await {
                match result {
                    Ok(rules) => {
                        per_instance.insert(endpoint, rules);
                    }
                    Err(err) => {
                        warn!(%service, %endpoint, error = %err, "failed to fetch rules");
                        per_instance.insert(endpoint, serde_json::Value::Null);
                    }
                }
            }
            out.insert(service, per_instance);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn topology_without_proxies() -> Topology {
        Topology::from_json(&json!({
            "services": [{"name": "a"}, {"name": "b"}],
            "dependencies": {"a": ["b"]}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn list_rules_for_unknown_service_is_empty() {
        let topology = topology_without_proxies();
        let fg = FailureGenerator::new(&topology);
        let result = fg.list_rules(Some("ghost")).await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn list_rules_for_none_covers_every_service() {
        let topology = topology_without_proxies();
        let fg = FailureGenerator::new(&topology);
        let result = fg.list_rules(None).await;
        assert_eq!(result.len(), 2);
        assert!(result.contains_key("a"));
        assert!(result.contains_key("b"));
    }

    #[test]
    fn fresh_generator_has_no_test_id() {
        let topology = topology_without_proxies();
        let fg = FailureGenerator::new(&topology);
        assert!(fg.test_id().is_none());
    }

    mod push_error_policy {
        use super::*;
        use crate::error::HarnessError;
        use crate::rule::{AbortFault, DelayFault, MangleFault, MessageType, Rule};
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn topology_with_one_proxy(address: &str) -> Topology {
            Topology::from_json(&json!({
                "services": [
                    {"name": "a", "service_proxies": [address]},
                    {"name": "b"}
                ],
                "dependencies": {"a": ["b"]}
            }))
            .unwrap()
        }

        fn abort_rule() -> Rule {
            Rule::new(
                "a",
                "b",
                MessageType::Request,
                "",
                "",
                DelayFault::default(),
                MangleFault::default(),
                AbortFault { probability: 1.0, ..Default::default() },
            )
            .unwrap()
        }

        #[tokio::test]
        async fn proxy_http_error_aborts_even_with_continue_on_error() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/gremlin/v1/rules/add"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&server)
                .await;

            let topology = topology_with_one_proxy(&server.address().to_string());
            let mut fg = FailureGenerator::new(&topology);
            fg.add_rules([abort_rule()]);

            let err = fg.push(true).await.unwrap_err();
            assert!(matches!(err, HarnessError::ProxyHttp { .. }));
        }

        #[tokio::test]
        async fn transport_error_is_swallowed_when_continue_on_error() {
            // Nothing is listening on this port: every request is a connection
            // failure, which `continue_on_error` is allowed to suppress.
            let topology = topology_with_one_proxy("127.0.0.1:1");
            let mut fg = FailureGenerator::new(&topology);
            fg.add_rules([abort_rule()]);

            fg.push(true).await.unwrap();
        }

        #[tokio::test]
        async fn transport_error_aborts_without_continue_on_error() {
            let topology = topology_with_one_proxy("127.0.0.1:1");
            let mut fg = FailureGenerator::new(&topology);
            fg.add_rules([abort_rule()]);

            let err = fg.push(false).await.unwrap_err();
            assert!(matches!(err, HarnessError::Transport { .. }));
        }
    }
}
