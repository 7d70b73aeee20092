//! Rollback command - remove the gateway and restore the legacy ingress
//!
//! Always exits zero once the cluster is reachable; individual failures are
//! reported as warnings.

use std::path::Path;

use tracing::warn;

use meshstack_provision::{Rollback, StackConfig};

use super::connect;
use crate::Result;

/// Run the rollback command
pub async fn run(config: &StackConfig, kubeconfig: Option<&Path>) -> Result<()> {
    let (cluster, releases) = connect(kubeconfig).await?;
    let report = Rollback::new(config, cluster, releases).run().await;

    for warning in &report.warnings {
        warn!(warning = %warning, "rollback warning");
    }

    println!("Rollback complete.");
    println!("  {}", report.release);
    println!("  Legacy ingress: {}", report.ingress);
    Ok(())
}
