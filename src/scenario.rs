//! Named, high-level failure scenarios and their expansion into concrete
//! [`Rule`]s against a [`Topology`].

use crate::error::{HarnessError, Result};
use crate::rule::{AbortFault, DelayFault, MangleFault, MessageType, Rule};
use crate::topology::Topology;
use serde::Deserialize;

/// One entry under `gremlins` in a recipe document: a scenario name
/// plus its own argument set, deserialized directly from the `scenario`
/// tagged enum shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "scenario", rename_all = "snake_case")]
pub enum Scenario {
    AbortRequests {
        source: String,
        dest: String,
        #[serde(default)]
        headerpattern: String,
        #[serde(default)]
        bodypattern: String,
        abortprobability: f64,
        #[serde(default)]
        errorcode: Option<i64>,
    },
    AbortResponses {
        source: String,
        dest: String,
        #[serde(default)]
        headerpattern: String,
        #[serde(default)]
        bodypattern: String,
        abortprobability: f64,
        #[serde(default)]
        errorcode: Option<i64>,
    },
    DelayRequests {
        source: String,
        dest: String,
        #[serde(default)]
        headerpattern: String,
        #[serde(default)]
        bodypattern: String,
        delayprobability: f64,
        delaytime: String,
    },
    DelayResponses {
        source: String,
        dest: String,
        #[serde(default)]
        headerpattern: String,
        #[serde(default)]
        bodypattern: String,
        delayprobability: f64,
        delaytime: String,
    },
    /// `source` is intentionally absent from the wire shape: this scenario
    /// always targets every caller of `dest`.
    OverloadService {
        dest: String,
        #[serde(default)]
        delayprobability: Option<f64>,
        #[serde(default)]
        delaytime: Option<String>,
        #[serde(default)]
        abortprobability: Option<f64>,
        #[serde(default)]
        errorcode: Option<i64>,
    },
    /// Splits into two independent abort rules, one per direction:
    /// `srcprobability`/`dstprobability` each govern their own rule and
    /// never alias one another.
    PartitionServices {
        source: String,
        dest: String,
        #[serde(default)]
        srcprobability: Option<f64>,
        #[serde(default)]
        dstprobability: Option<f64>,
        #[serde(default)]
        errorcode: Option<i64>,
    },
    CrashService {
        dest: String,
        #[serde(default)]
        abortprobability: Option<f64>,
        #[serde(default)]
        errorcode: Option<i64>,
    },
}

/// Resolves the `{source, dest}` shorthand used throughout the scenario
/// vocabulary into concrete `(sources, dests)` product lists: if both are
/// declared services, a single edge; if only one is declared, fan out over
/// the other's direct dependencies/dependents.
fn resolve_endpoints(topology: &Topology, source: &str, dest: &str) -> Result<(Vec<String>, Vec<String>)> {
    let source_known = !source.is_empty() && topology.has_service(source);
    let dest_known = !dest.is_empty() && topology.has_service(dest);

    if source_known && dest_known {
        Ok((vec![source.to_string()], vec![dest.to_string()]))
    } else if source_known {
        Ok((vec![source.to_string()], topology.dependencies(source)))
    } else if dest_known {
        Ok((topology.dependents(dest), vec![dest.to_string()]))
    } else {
        Err(HarnessError::Input(format!(
            "neither source {:?} nor dest {:?} is a declared service",
            source, dest
        )))
    }
}

/// Expands [`Scenario`] values against a [`Topology`] into the concrete
/// [`Rule`]s that get pushed to proxies.
pub struct ScenarioExpander<'a> {
    topology: &'a Topology,
}

impl<'a> ScenarioExpander<'a> {
    pub fn new(topology: &'a Topology) -> Self {
        Self { topology }
    }

    /// Expand one scenario into the rules it implies. Every source/dest
    /// pair the scenario resolves to gets its own [`Rule`].
    pub fn expand(&self, scenario: &Scenario) -> Result<Vec<Rule>> {
        match scenario {
            Scenario::AbortRequests { source, dest, headerpattern, bodypattern, abortprobability, errorcode } => {
                self.abort(source, dest, MessageType::Request, headerpattern, bodypattern, *abortprobability, errorcode.unwrap_or(-1))
            }
            Scenario::AbortResponses { source, dest, headerpattern, bodypattern, abortprobability, errorcode } => {
                self.abort(source, dest, MessageType::Response, headerpattern, bodypattern, *abortprobability, errorcode.unwrap_or(-1))
            }
            Scenario::DelayRequests { source, dest, headerpattern, bodypattern, delayprobability, delaytime } => {
                self.delay(source, dest, MessageType::Request, headerpattern, bodypattern, *delayprobability, delaytime)
            }
            Scenario::DelayResponses { source, dest, headerpattern, bodypattern, delayprobability, delaytime } => {
                self.delay(source, dest, MessageType::Response, headerpattern, bodypattern, *delayprobability, delaytime)
            }
            Scenario::OverloadService { dest, delayprobability, delaytime, abortprobability, errorcode } => {
                self.overload(
                    dest,
                    delayprobability.unwrap_or(0.5),
                    delaytime.as_deref().unwrap_or("10s"),
                    abortprobability.unwrap_or(0.5),
                    errorcode.unwrap_or(503),
                )
            }
            Scenario::PartitionServices { source, dest, srcprobability, dstprobability, errorcode } => {
                self.partition(source, dest, srcprobability.unwrap_or(1.0), dstprobability.unwrap_or(1.0), errorcode.unwrap_or(-1))
            }
            Scenario::CrashService { dest, abortprobability, errorcode } => {
                self.crash(dest, abortprobability.unwrap_or(1.0), errorcode.unwrap_or(-1))
            }
        }
    }

    fn abort(
        &self,
        source: &str,
        dest: &str,
        messagetype: MessageType,
        headerpattern: &str,
        bodypattern: &str,
        probability: f64,
        errorcode: i64,
    ) -> Result<Vec<Rule>> {
        let (sources, dests) = resolve_endpoints(self.topology, source, dest)?;
        let abort = AbortFault { probability, errorcode, ..Default::default() };
        let mut rules = Vec::with_capacity(sources.len() * dests.len());
        for s in &sources {
            for d in &dests {
                rules.push(Rule::new(
                    s,
                    d,
                    messagetype,
                    headerpattern,
                    bodypattern,
                    DelayFault::default(),
                    MangleFault::default(),
                    abort.clone(),
                )?);
            }
        }
        Ok(rules)
    }

    fn delay(
        &self,
        source: &str,
        dest: &str,
        messagetype: MessageType,
        headerpattern: &str,
        bodypattern: &str,
        probability: f64,
        duration: &str,
    ) -> Result<Vec<Rule>> {
        let (sources, dests) = resolve_endpoints(self.topology, source, dest)?;
        let delay = DelayFault { probability, duration: duration.to_string(), ..Default::default() };
        let mut rules = Vec::with_capacity(sources.len() * dests.len());
        for s in &sources {
            for d in &dests {
                rules.push(Rule::new(
                    s,
                    d,
                    messagetype,
                    headerpattern,
                    bodypattern,
                    delay.clone(),
                    MangleFault::default(),
                    AbortFault::default(),
                )?);
            }
        }
        Ok(rules)
    }

    /// Every caller of `dest` gets half its requests delayed and half aborted,
    /// simulating an overloaded service from the callers' point of view.
    fn overload(
        &self,
        dest: &str,
        delayprobability: f64,
        delaytime: &str,
        abortprobability: f64,
        errorcode: i64,
    ) -> Result<Vec<Rule>> {
        let sources = self.topology.dependents(dest);
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let delay = DelayFault { probability: delayprobability, duration: delaytime.to_string(), ..Default::default() };
        let abort = AbortFault { probability: abortprobability, errorcode, ..Default::default() };
        sources
            .iter()
            .map(|s| Rule::new(s, dest, MessageType::Request, "", "", delay.clone(), MangleFault::default(), abort.clone()))
            .collect()
    }

    /// Partitions a single edge: `srcprobability` controls the rule aborting
    /// `source -> dest` requests, `dstprobability` controls the rule
    /// aborting `dest -> source` requests. The two probabilities are
    /// independent of one another.
    fn partition(
        &self,
        source: &str,
        dest: &str,
        srcprobability: f64,
        dstprobability: f64,
        errorcode: i64,
    ) -> Result<Vec<Rule>> {
        if !self.topology.dependencies(source).iter().any(|d| d == dest) {
            return Err(HarnessError::Input(format!(
                "partition_services: {:?} does not depend on {:?} in the topology",
                source, dest
            )));
        }
        let forward = Rule::new(
            source,
            dest,
            MessageType::Request,
            "",
            "",
            DelayFault::default(),
            MangleFault::default(),
            AbortFault { probability: srcprobability, errorcode, ..Default::default() },
        )?;
        let backward = Rule::new(
            dest,
            source,
            MessageType::Request,
            "",
            "",
            DelayFault::default(),
            MangleFault::default(),
            AbortFault { probability: dstprobability, errorcode, ..Default::default() },
        )?;
        Ok(vec![forward, backward])
    }

    /// `dest` becomes unreachable to every caller: one abort rule per
    /// dependent, each sourced from that dependent.
    fn crash(&self, dest: &str, abortprobability: f64, errorcode: i64) -> Result<Vec<Rule>> {
        let sources = self.topology.dependents(dest);
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let abort = AbortFault { probability: abortprobability, errorcode, ..Default::default() };
        sources
            .iter()
            .map(|s| Rule::new(s, dest, MessageType::Request, "", "", DelayFault::default(), MangleFault::default(), abort.clone()))
            .collect()
    }
}
