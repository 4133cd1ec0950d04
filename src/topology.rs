//! The service dependency graph that scenario expansion and rule fan-out
//! read from. Immutable after construction; no I/O.

use crate::error::{HarnessError, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A named service and the proxy endpoints (`host:port`) that enforce
/// fault-injection rules on its behalf. Zero endpoints is legal: the
/// service exists in the graph but is not instrumentable, and targeting it
/// for injection is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub proxies: Vec<String>,
}

/// Wire shape of one entry under `services` in the topology document.
#[derive(Debug, Deserialize)]
struct ServiceDoc {
    name: String,
    #[serde(default)]
    service_proxies: Vec<String>,
}

/// Wire shape of the topology document.
#[derive(Debug, Deserialize)]
struct TopologyDoc {
    services: Vec<ServiceDoc>,
    #[serde(default)]
    dependencies: HashMap<String, Vec<String>>,
}

/// A directed graph of services where an edge `u -> v` means "u depends on
/// v". Cycles are permitted by construction but never traversed: scenario
/// expansion only ever reads direct adjacency.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    services: Vec<Service>,
    index: HashMap<String, usize>,
    // dependencies[u] = { v | u -> v }, dependents[v] = { u | u -> v }
    dependencies: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
}

impl Topology {
    /// Build a topology from its JSON document. Rejects duplicate service
    /// names and dependency edges referencing unknown services.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let doc: TopologyDoc = serde_json::from_value(value.clone())
            .map_err(|e| HarnessError::Input(format!("malformed topology document: {e}")))?;

        let mut services = Vec::with_capacity(doc.services.len());
        let mut index = HashMap::with_capacity(doc.services.len());
        let mut seen = HashSet::new();

        for svc in doc.services {
            if !seen.insert(svc.name.clone()) {
                return Err(HarnessError::Input(format!(
                    "duplicate service name {:?} in topology",
                    svc.name
                )));
            }
            index.insert(svc.name.clone(), services.len());
            services.push(Service { name: svc.name, proxies: svc.service_proxies });
        }

        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for (source, dests) in doc.dependencies {
            if !index.contains_key(&source) {
                return Err(HarnessError::Input(format!(
                    "dependency source {:?} is not a declared service",
                    source
                )));
            }
            for dest in dests {
                if !index.contains_key(&dest) {
                    return Err(HarnessError::Input(format!(
                        "dependency target {:?} (from {:?}) is not a declared service",
                        dest, source
                    )));
                }
                dependencies.entry(source.clone()).or_default().push(dest.clone());
                dependents.entry(dest).or_default().push(source.clone());
            }
        }

        Ok(Self { services, index, dependencies, dependents })
    }

    /// All declared service names, in topology insertion order.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|s| s.name.as_str())
    }

    /// Whether `name` is a declared service.
    pub fn has_service(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// `{ v | u -> v }`: the services `source` depends on.
    pub fn dependencies(&self, source: &str) -> Vec<String> {
        self.dependencies.get(source).cloned().unwrap_or_default()
    }

    /// `{ u | u -> dest }`: the services that depend on `dest`.
    pub fn dependents(&self, dest: &str) -> Vec<String> {
        self.dependents.get(dest).cloned().unwrap_or_default()
    }

    /// The proxy endpoints for a declared service. Returns an empty slice
    /// for an uninstrumented (but declared) service.
    pub fn endpoints(&self, service: &str) -> &[String] {
        match self.index.get(service) {
            Some(&i) => &self.services[i].proxies,
            None => &[],
        }
    }
}

impl fmt::Display for Topology {
    /// Mirrors `ApplicationGraph.__str__`: one `Node: X` line per service,
    /// then one `Edge: A->B` line per dependency edge, in insertion order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for service in &self.services {
            writeln!(f, "Node: {}", service.name)?;
        }
        for service in &self.services {
            for dest in self.dependencies.get(&service.name).into_iter().flatten() {
                writeln!(f, "Edge: {}->{}", service.name, dest)?;
            }
        }
        Ok(())
    }
}
