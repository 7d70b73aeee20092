//! Install command - converge the cluster onto the full stack
//!
//! Logs the stage plan, runs every stage, and prints where the gateway can
//! be reached. An aborted install is returned as an error so the process
//! exits non-zero.

use std::path::Path;

use clap::Args;
use tracing::{info, warn};

use meshstack_provision::{
    AccessMethod, InstallReport, InstallState, Installer, StackConfig, StageGraph,
};

use super::connect;
use crate::{Error, Result};

/// Install or converge the stack
#[derive(Args, Debug, Default)]
pub struct InstallArgs {
    /// Print the stage plan and exit without touching the cluster
    #[arg(long)]
    pub plan: bool,
}

/// Run the install command
pub async fn run(args: InstallArgs, config: &StackConfig, kubeconfig: Option<&Path>) -> Result<()> {
    let graph = StageGraph::canonical(config)?;

    if args.plan {
        for line in graph.describe() {
            println!("{}", line);
        }
        return Ok(());
    }

    for line in graph.describe() {
        info!("plan: {}", line);
    }

    let (cluster, releases) = connect(kubeconfig).await?;
    let report = Installer::new(config, cluster, releases)
        .run_graph(&graph)
        .await;

    for warning in report.warnings() {
        warn!(warning, "install warning");
    }

    match report.state {
        InstallState::Aborted { stage, name, cause } => {
            Err(Error::InstallAborted { stage, name, cause })
        }
        _ => {
            print_summary(&report);
            Ok(())
        }
    }
}

fn print_summary(report: &InstallReport) {
    println!("Install complete.");
    match &report.endpoint {
        Some(endpoint) => {
            println!("  Gateway: {}", endpoint.url());
            if let AccessMethod::PortForward { command } = &endpoint.method {
                println!("  Reach it with: {}", command);
            }
        }
        None => println!("  Gateway endpoint unknown"),
    }
    if let Some(migration) = &report.migration {
        println!("  Legacy ingress: {}", migration);
    }

    let warnings = report.warnings().count();
    if warnings > 0 {
        println!("  {} warning(s); see log output", warnings);
    }
}
