//! Error types for the harness core.

use thiserror::Error;

/// Errors the core can produce. Maps onto the five kinds the harness
/// distinguishes: malformed input, transport failure, non-2xx from a proxy,
/// a failed assertion, and empty log results (a specialization of a failed
/// assertion).
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Malformed topology/recipe/checklist, unknown service reference,
    /// invalid scenario/check name, duration parse failure, or an invalid
    /// probability sum. Fatal to the recipe (process exit 2).
    #[error("invalid input: {0}")]
    Input(String),

    /// A proxy or the log store was unreachable at the transport layer.
    /// Carries the endpoint and operation so callers can report precisely.
    /// Boxed rather than tied to `reqwest::Error` so the same variant
    /// covers both the proxy HTTP client and the Elasticsearch transport.
    #[error("transport error contacting {endpoint} during {operation}: {source}")]
    Transport {
        endpoint: String,
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A proxy responded with a non-2xx status. Never retried.
    #[error("proxy {endpoint} rejected {operation} for rule on {rule_source}->{rule_dest}: HTTP {status}")]
    ProxyHttp {
        endpoint: String,
        operation: &'static str,
        rule_source: String,
        rule_dest: String,
        status: u16,
    },

    /// An assertion's contract was violated. Not a harness error in the
    /// exit-2 sense: it flows into the checklist result vector.
    #[error("check failed: {0}")]
    CheckFailure(String),

    /// A check's query against the log store returned zero matching events.
    /// Always reported with the fixed message below, mirroring the original.
    #[error("No log entries found")]
    EmptyLogs,
}

impl HarnessError {
    /// Whether this error is an [`HarnessError::Input`] variant.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }

    /// Whether this error is an [`HarnessError::Transport`] variant.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// The process exit code this error should translate to.
    /// `CheckFailure`/`EmptyLogs` are not terminal errors (they flow into
    /// the result vector), so they have no single exit code of their own;
    /// the recipe orchestrator derives exit 1 from the result vector instead.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Input(_) => Some(2),
            Self::Transport { .. } | Self::ProxyHttp { .. } => Some(2),
            Self::CheckFailure(_) | Self::EmptyLogs => None,
        }
    }
}

/// Convenience alias used throughout the core.
pub type Result<T> = std::result::Result<T, HarnessError>;
