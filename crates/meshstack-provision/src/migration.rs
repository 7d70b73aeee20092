//! Migration assist for the competing ingress controller
//!
//! The gateway takes over ingress, so the pre-existing controller is scaled
//! to zero during install and back to one replica on rollback. The result is
//! reported on its own channel and never fails the run.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cluster::{ClusterApi, ScaleOutcome};
use crate::config::WorkloadRef;

/// Replicas restored on rollback
pub const RESTORED_REPLICAS: i32 = 1;

/// What the assist did to the competing controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Replica count was set
    Scaled {
        /// The workload
        workload: WorkloadRef,
        /// New replica count
        replicas: i32,
    },
    /// The controller is not installed; nothing to do
    Absent,
    /// The scale request failed
    Failed(String),
}

impl MigrationOutcome {
    /// Whether the outcome leaves nothing for an operator to fix
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scaled { workload, replicas } => write!(
                f,
                "scaled {}/{} to {} replica(s)",
                workload.namespace, workload.name, replicas
            ),
            Self::Absent => write!(f, "legacy ingress not present"),
            Self::Failed(msg) => write!(f, "legacy ingress scale failed: {}", msg),
        }
    }
}

/// Suspends and restores the competing ingress controller
pub struct MigrationAssist {
    cluster: Arc<dyn ClusterApi>,
    target: WorkloadRef,
}

impl MigrationAssist {
    /// Assist for `target`
    pub fn new(cluster: Arc<dyn ClusterApi>, target: WorkloadRef) -> Self {
        Self { cluster, target }
    }

    /// Scale the controller to zero
    pub async fn suspend(&self) -> MigrationOutcome {
        self.scale(0).await
    }

    /// Scale the controller back to one replica
    pub async fn restore(&self) -> MigrationOutcome {
        self.scale(RESTORED_REPLICAS).await
    }

    async fn scale(&self, replicas: i32) -> MigrationOutcome {
        let WorkloadRef { name, namespace } = &self.target;
        match self.cluster.scale_workload(name, namespace, replicas).await {
            Ok(ScaleOutcome::Scaled { replicas }) => {
                info!(workload = %name, namespace = %namespace, replicas, "scaled legacy ingress");
                MigrationOutcome::Scaled {
                    workload: self.target.clone(),
                    replicas,
                }
            }
            Ok(ScaleOutcome::NotFound) => {
                info!(workload = %name, namespace = %namespace, "legacy ingress not present, skipping");
                MigrationOutcome::Absent
            }
            Err(e) => {
                warn!(workload = %name, namespace = %namespace, error = %e, "failed to scale legacy ingress");
                MigrationOutcome::Failed(e.to_string())
            }
        }
    }
}
