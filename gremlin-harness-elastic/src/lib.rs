//! Elasticsearch-backed [`LogStore`] for gremlin-harness.
//! Bring your own `elasticsearch::Elasticsearch` client; queries are
//! executed against one index holding the structured proxy log events.

use async_trait::async_trait;
use elasticsearch::{Elasticsearch, SearchParts};
use gremlin_harness::{
    AggBucket, HarnessError, LogEvent, LogQuery, LogStore, Result, SearchResult, MAX_QUERY_RESULTS,
};
use serde_json::Value;
use tracing::debug;

/// Executes [`LogQuery`]s against one Elasticsearch index.
#[derive(Clone, Debug)]
pub struct ElasticLogStore {
    index: String,
    client: Elasticsearch,
}

impl ElasticLogStore {
    /// Build a log store over `index` using an existing Elasticsearch client.
    pub fn new(client: Elasticsearch, index: impl Into<String>) -> Result<Self> {
        let index = index.into();
        if index.is_empty() {
            return Err(HarnessError::Input("index name cannot be empty".to_string()));
        }
        Ok(Self { index, client })
    }

    fn transport_err(&self, operation: &'static str, source: elasticsearch::Error) -> HarnessError {
        HarnessError::Transport { endpoint: self.index.clone(), operation, source: Box::new(source) }
    }
}

#[async_trait]
impl LogStore for ElasticLogStore {
    async fn search(&self, query: &LogQuery) -> Result<SearchResult> {
        let body = query.to_body(MAX_QUERY_RESULTS);
        debug!(index = %self.index, "searching log store");
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index]))
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_err("search", e))?;

        let response = response
            .error_for_status_code()
            .map_err(|e| self.transport_err("search", e))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| self.transport_err("search", e))?;

        parse_search_response(&payload)
    }
}

fn parse_search_response(payload: &Value) -> Result<SearchResult> {
    let hits_section = &payload["hits"];

    let total = match &hits_section["total"] {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::Object(obj) => obj.get("value").and_then(Value::as_u64).unwrap_or(0),
        _ => 0,
    };

    let mut hits = Vec::new();
    if let Some(array) = hits_section["hits"].as_array() {
        for hit in array {
            let event: LogEvent = serde_json::from_value(hit["_source"].clone())
                .map_err(|e| HarnessError::Input(format!("malformed log event in store response: {e}")))?;
            hits.push(event);
        }
    }

    let mut aggregations = std::collections::HashMap::new();
    if let Some(aggs) = payload.get("aggregations").and_then(Value::as_object) {
        for (name, agg) in aggs {
            let buckets = agg["buckets"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .map(|b| AggBucket { key: b["key"].clone(), doc_count: b["doc_count"].as_u64().unwrap_or(0) })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            aggregations.insert(name.clone(), buckets);
        }
    }

    Ok(SearchResult { total, hits, aggregations })
}
