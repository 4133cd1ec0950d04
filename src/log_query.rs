//! The structured-log query vocabulary and the event shape it reads
//! back. The vocabulary mirrors the Elasticsearch query DSL directly:
//! that's the shape the wire format already has, so [`LogQuery::to_body`]
//! builds exactly that JSON rather than inventing a new abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;

/// One log line emitted by a proxy, as read back from the log store.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,
    pub testid: String,
    pub source: String,
    pub dest: String,
    pub msg: MessageKind,
    #[serde(rename = "reqID")]
    pub req_id: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    /// `<number><unit>` duration string; parse with [`crate::duration_fmt::parse_duration`].
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub errmsg: Option<String>,
}

/// `msg` discriminator on a [`LogEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Request,
    Response,
}

/// One bucket of a terms aggregation: `key` is the aggregated field's
/// value (a string or a number, depending on the field), `doc_count` the
/// number of matching events.
#[derive(Debug, Clone, Deserialize)]
pub struct AggBucket {
    pub key: Value,
    pub doc_count: u64,
}

/// The result of running a [`LogQuery`] against a [`LogStore`].
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub total: u64,
    pub hits: Vec<LogEvent>,
    /// Keyed by aggregation name (only ever `"byid"`, `"bysource"`, or
    /// similar single-aggregation queries in this harness).
    pub aggregations: std::collections::HashMap<String, Vec<AggBucket>>,
}

impl SearchResult {
    /// Whether the query matched at least one event, per the
    /// "no log entries found" contract a check falls back on otherwise.
    pub fn is_non_empty(&self) -> bool {
        self.total != 0 && !self.hits.is_empty()
    }
}

#[derive(Debug, Clone)]
enum Filter {
    Term { field: &'static str, value: String },
    Exists { field: &'static str },
    Prefix { field: &'static str, value: String },
}

impl Filter {
    fn to_json(&self) -> Value {
        match self {
            Filter::Term { field, value } => json!({ "term": { *field: value } }),
            Filter::Exists { field } => json!({ "exists": { "field": field } }),
            Filter::Prefix { field, value } => json!({ "prefix": { *field: value } }),
        }
    }
}

#[derive(Debug, Clone)]
struct TermsAggregation {
    name: &'static str,
    field: &'static str,
}

/// Builds the query/filter/aggregation body a [`LogStore`] executes.
/// Every check in [`crate::assertion_checker`] constructs one of these
/// rather than hand-assembling JSON.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    must: Vec<Filter>,
    should: Vec<Filter>,
    aggregation: Option<TermsAggregation>,
}

impl LogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.must.push(Filter::Term { field, value: value.into() });
        self
    }

    pub fn exists(mut self, field: &'static str) -> Self {
        self.must.push(Filter::Exists { field });
        self
    }

    pub fn prefix(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.must.push(Filter::Prefix { field, value: value.into() });
        self
    }

    /// Adds a `should`-clause alternative (used by `check_circuit_breaker`
    /// to match either `msg: Request` or `msg: Response`).
    pub fn should_term(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.should.push(Filter::Term { field, value: value.into() });
        self
    }

    pub fn terms_aggregation(mut self, name: &'static str, field: &'static str) -> Self {
        self.aggregation = Some(TermsAggregation { name, field });
        self
    }

    /// Render the query body in the `filtered`/`bool` shape the log store
    /// expects on the wire.
    pub fn to_body(&self, max_results: u64) -> Value {
        let filter = if self.should.is_empty() && self.must.len() == 1 {
            self.must[0].to_json()
        } else {
            let mut bool_filter = serde_json::Map::new();
            if !self.must.is_empty() {
                bool_filter.insert(
                    "must".to_string(),
                    Value::Array(self.must.iter().map(Filter::to_json).collect()),
                );
            }
            if !self.should.is_empty() {
                bool_filter.insert(
                    "should".to_string(),
                    Value::Array(self.should.iter().map(Filter::to_json).collect()),
                );
            }
            json!({ "bool": Value::Object(bool_filter) })
        };

        let mut body = json!({
            "size": max_results,
            "query": {
                "filtered": {
                    "query": { "match_all": {} },
                    "filter": filter
                }
            }
        });

        if let Some(agg) = &self.aggregation {
            body["aggs"] = json!({
                agg.name: { "terms": { "field": agg.field } }
            });
        }

        body
    }
}

/// Upper bound on returned hits, matching the original's "return
/// everything" sizing.
pub const MAX_QUERY_RESULTS: u64 = (1u64 << 31) - 1;

/// Abstracts the log store transport so the checker logic in
/// [`crate::assertion_checker`] doesn't depend on any one backend.
/// `gremlin-harness-elastic` provides the concrete Elasticsearch-backed
/// implementation.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn search(&self, query: &LogQuery) -> Result<SearchResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_term_query_is_not_wrapped_in_bool() {
        let body = LogQuery::new().term("level", "error").to_body(MAX_QUERY_RESULTS);
        let filter = &body["query"]["filtered"]["filter"];
        assert!(filter.get("term").is_some());
        assert!(filter.get("bool").is_none());
    }

    #[test]
    fn multiple_musts_are_wrapped_in_bool() {
        let body = LogQuery::new()
            .term("msg", "Response")
            .term("source", "a")
            .to_body(MAX_QUERY_RESULTS);
        let must = &body["query"]["filtered"]["filter"]["bool"]["must"];
        assert_eq!(must.as_array().unwrap().len(), 2);
    }

    #[test]
    fn should_clause_is_preserved_alongside_must() {
        let body = LogQuery::new()
            .term("source", "a")
            .should_term("msg", "Request")
            .should_term("msg", "Response")
            .to_body(MAX_QUERY_RESULTS);
        let bool_filter = &body["query"]["filtered"]["filter"]["bool"];
        assert_eq!(bool_filter["must"].as_array().unwrap().len(), 1);
        assert_eq!(bool_filter["should"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn terms_aggregation_is_attached_by_name() {
        let body = LogQuery::new()
            .term("source", "a")
            .terms_aggregation("byid", "reqID")
            .to_body(MAX_QUERY_RESULTS);
        assert_eq!(body["aggs"]["byid"]["terms"]["field"], "reqID");
    }

    #[test]
    fn empty_search_result_is_not_non_empty() {
        assert!(!SearchResult::default().is_non_empty());
    }
}
