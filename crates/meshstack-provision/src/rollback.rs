//! Rollback orchestrator
//!
//! Tears down the gateway release and restores the competing ingress
//! controller. The control plane, namespaces, mesh, and policies are left in
//! place. Every step is best-effort: "already absent" is success and a
//! failure in one step never prevents the next.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use meshstack_common::mesh::GATEWAY_RELEASE;

use crate::cluster::ClusterApi;
use crate::config::StackConfig;
use crate::migration::{MigrationAssist, MigrationOutcome};
use crate::release::{ReleaseManager, UninstallOutcome};

/// What happened to the gateway release
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReleaseRemoval {
    /// The release was uninstalled
    Removed,
    /// There was nothing to uninstall
    AlreadyAbsent,
    /// Uninstall failed
    Failed(String),
}

impl fmt::Display for ReleaseRemoval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Removed => write!(f, "gateway release removed"),
            Self::AlreadyAbsent => write!(f, "gateway release already absent"),
            Self::Failed(msg) => write!(f, "gateway release removal failed: {}", msg),
        }
    }
}

/// Summary of a rollback run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RollbackReport {
    /// Gateway release outcome
    pub release: ReleaseRemoval,
    /// Legacy ingress restore outcome
    pub ingress: MigrationOutcome,
    /// Failures that were tolerated
    pub warnings: Vec<String>,
}

impl RollbackReport {
    /// Whether every step reached its desired state
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Reverses the data-plane portion of an install
pub struct Rollback<'a> {
    config: &'a StackConfig,
    cluster: Arc<dyn ClusterApi>,
    releases: Arc<dyn ReleaseManager>,
}

impl<'a> Rollback<'a> {
    /// Create a rollback for `config`
    pub fn new(
        config: &'a StackConfig,
        cluster: Arc<dyn ClusterApi>,
        releases: Arc<dyn ReleaseManager>,
    ) -> Self {
        Self {
            config,
            cluster,
            releases,
        }
    }

    /// Uninstall the gateway and restore the legacy ingress
    pub async fn run(&self) -> RollbackReport {
        let mut warnings = Vec::new();
        let namespace = self.config.gateway_namespace();

        info!(release = GATEWAY_RELEASE, namespace, "uninstalling gateway release");
        let release = match self.releases.uninstall(GATEWAY_RELEASE, namespace).await {
            Ok(UninstallOutcome::Removed) => ReleaseRemoval::Removed,
            Ok(UninstallOutcome::NotFound) => {
                info!(release = GATEWAY_RELEASE, "gateway release not found, nothing to remove");
                ReleaseRemoval::AlreadyAbsent
            }
            Err(e) => {
                warn!(release = GATEWAY_RELEASE, error = %e, "failed to uninstall gateway release");
                ReleaseRemoval::Failed(e.to_string())
            }
        };
        if let ReleaseRemoval::Failed(_) = &release {
            warnings.push(release.to_string());
        }

        let ingress = MigrationAssist::new(
            self.cluster.clone(),
            self.config.legacy_ingress().clone(),
        )
        .restore()
        .await;
        if !ingress.is_ok() {
            warnings.push(ingress.to_string());
        }

        info!(release = %release, ingress = %ingress, "rollback finished");
        RollbackReport {
            release,
            ingress,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MockClusterApi, ScaleOutcome};
    use crate::release::MockReleaseManager;
    use meshstack_common::Error;

    #[tokio::test]
    async fn nothing_installed_is_a_clean_rollback() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_scale_workload()
            .returning(|_, _, _| Ok(ScaleOutcome::NotFound));
        let mut releases = MockReleaseManager::new();
        releases
            .expect_uninstall()
            .withf(|name, ns| name == "kong" && ns == "gateway")
            .returning(|_, _| Ok(UninstallOutcome::NotFound));

        let config = StackConfig::default();
        let report = Rollback::new(&config, Arc::new(cluster), Arc::new(releases))
            .run()
            .await;

        assert_eq!(report.release, ReleaseRemoval::AlreadyAbsent);
        assert_eq!(report.ingress, MigrationOutcome::Absent);
        assert!(report.is_clean());
    }

    /// Story: a broken helm install must not stop the ingress from coming back.
    #[tokio::test]
    async fn uninstall_failure_still_restores_ingress() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_scale_workload()
            .withf(|_, _, replicas| *replicas == 1)
            .times(1)
            .returning(|_, _, r| Ok(ScaleOutcome::Scaled { replicas: r }));
        let mut releases = MockReleaseManager::new();
        releases
            .expect_uninstall()
            .returning(|name, _| Err(Error::release(name, "cluster unreachable")));

        let config = StackConfig::default();
        let report = Rollback::new(&config, Arc::new(cluster), Arc::new(releases))
            .run()
            .await;

        assert!(matches!(report.release, ReleaseRemoval::Failed(_)));
        assert!(matches!(
            report.ingress,
            MigrationOutcome::Scaled { replicas: 1, .. }
        ));
        assert_eq!(report.warnings.len(), 1);
    }
}
