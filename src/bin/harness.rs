//! CLI front-end: `harness <topology.json> <gremlins.json> <checklist.json>`.
//!
//! Reads the three recipe documents, clears and installs gremlins on the
//! topology's proxies, stamps a fresh test id, waits for the operator to
//! drive test traffic, then runs the checklist against the log store and
//! prints one `Check <name> <args> PASS|FAIL` line per check.
//!
//! Exit codes: `0` all checks passed, `1` at least one failed, `2` bad
//! input (malformed document, unreachable proxy, non-2xx from a proxy).

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use elasticsearch::http::transport::Transport;
use elasticsearch::Elasticsearch;
use gremlin_harness::prelude::*;
use gremlin_harness_elastic::ElasticLogStore;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "harness", about = "Resilience-test harness for microservice meshes")]
struct Cli {
    /// Topology document: services and their dependency graph.
    topology: PathBuf,
    /// Gremlin recipe document: scenarios to install before the test.
    gremlins: PathBuf,
    /// Checklist document: log store address and assertions to run.
    checklist: PathBuf,
    /// Keep fanning rules out to remaining proxies after one push fails.
    #[arg(long)]
    continue_on_error: bool,
    /// Index (or index pattern) in the log store to query. The log store's
    /// query surface is fixed, but nothing names an index convention for
    /// it, so this defaults to the common ELK daily-rotation pattern and
    /// can be overridden per deployment.
    #[arg(long, default_value = "logstash-*")]
    log_index: String,
}

fn init_tracing() {
    let debug = std::env::var("GREMLINSDK_DEBUG").map(|v| !v.is_empty()).unwrap_or(false);
    let filter = EnvFilter::new(if debug { "debug" } else { "info" });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn read_json(path: &PathBuf) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| HarnessError::Input(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| HarnessError::Input(format!("malformed JSON in {}: {e}", path.display())))
}

/// The operator barrier: blocks on a single byte from stdin so the caller
/// can drive test traffic between rule installation and assertion checks.
fn wait_for_operator() {
    println!("gremlins installed. Drive test traffic, then press Enter to check assertions...");
    let mut buf = [0u8; 1];
    let _ = std::io::stdin().read(&mut buf);
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(all_passed) => ExitCode::from(if all_passed { 0 } else { 1 }),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code().unwrap_or(2) as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let topology = Topology::from_json(&read_json(&cli.topology)?)?;

    let gremlins: GremlinsDocument = serde_json::from_value(read_json(&cli.gremlins)?)
        .map_err(|e| HarnessError::Input(format!("malformed gremlins document: {e}")))?;

    let checklist: ChecklistDocument = serde_json::from_value(read_json(&cli.checklist)?)
        .map_err(|e| HarnessError::Input(format!("malformed checklist document: {e}")))?;

    let test_id = setup_failures(&topology, &gremlins, cli.continue_on_error).await?;
    println!("started test {test_id}");

    wait_for_operator();

    let transport = Transport::single_node(&checklist.log_server).map_err(|e| HarnessError::Transport {
        endpoint: checklist.log_server.clone(),
        operation: "connect",
        source: Box::new(e),
    })?;
    let client = Elasticsearch::new(transport);
    let store = ElasticLogStore::new(client, cli.log_index)?;
    let checker = AssertionChecker::new(Arc::new(store), test_id.to_string());

    let results = checker.check_all(&checklist.checks, false).await?;

    let mut all_passed = true;
    for result in &results {
        let status = if result.success { "PASS" } else { "FAIL" };
        println!("Check {} {} {status}", result.name, result.info);
        if !result.success {
            all_passed = false;
            if !result.errormsg.is_empty() {
                eprintln!("  {}", result.errormsg);
            }
        }
    }

    Ok(all_passed)
}
