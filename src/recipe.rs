//! Ties a topology, a set of gremlins, and a checklist together into one
//! test run: clear existing rules, install the gremlins, start the test,
//! push to proxies. Checking assertions afterward is the caller's job
//! (it happens once whatever traffic the operator wants to exercise has
//! run against the topology).

use serde::Deserialize;
use tracing::debug;

use crate::check::Check;
use crate::error::{HarnessError, Result};
use crate::failure_generator::FailureGenerator;
use crate::scenario::{Scenario, ScenarioExpander};
use crate::testid::TestId;
use crate::topology::Topology;

/// Wire shape of a gremlins document: a flat list of scenarios to
/// install before a test run.
#[derive(Debug, Deserialize)]
pub struct GremlinsDocument {
    pub gremlins: Vec<Scenario>,
}

/// Wire shape of a checklist document: where to query logs from, and
/// the assertions to run against them.
#[derive(Debug, Deserialize)]
pub struct ChecklistDocument {
    pub log_server: String,
    pub checks: Vec<Check>,
}

/// Clears every proxy's existing rules, expands and installs the gremlins
/// from `doc`, and starts a fresh test. Returns the id that assertion
/// checks must be scoped to afterward.
pub async fn setup_failures(
    topology: &Topology,
    doc: &GremlinsDocument,
    continue_on_error: bool,
) -> Result<TestId> {
    debug!("using topology:\n{topology}");

    let mut generator = FailureGenerator::new(topology);
    generator.clear_all().await?;

    let expander = ScenarioExpander::new(topology);
    for gremlin in &doc.gremlins {
        let rules = expander.expand(gremlin).map_err(|e| match e {
            HarnessError::Input(msg) => HarnessError::Input(format!("gremlin {gremlin:?}: {msg}")),
            other => other,
        })?;
        generator.add_rules(rules);
    }

    let test_id = generator.start_new_test().await?;
    generator.push(continue_on_error).await?;
    Ok(test_id)
}
