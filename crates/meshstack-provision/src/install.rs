//! Install orchestrator
//!
//! Drives a [`StageGraph`] start to finish as a small state machine:
//!
//! ```text
//! NotStarted -> Running(1) -> Running(2) -> ... -> Completed
//!                    |             |
//!                    +-------------+--> Aborted(i, cause)   (Fatal stage i failed)
//! ```
//!
//! A stage that fails under [`FailurePolicy::WarnAndContinue`] records its
//! failures as warnings and the run moves on.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use meshstack_common::mesh::{
    gateway_proxy_service, permission_name, GATEWAY_RELEASE, TRAFFIC_PERMISSION_CRD,
};
use meshstack_common::Result;

use crate::applier::{ApplyResult, ResourceApplier};
use crate::cluster::ClusterApi;
use crate::config::StackConfig;
use crate::endpoint::AccessEndpoint;
use crate::graph::StageGraph;
use crate::migration::{MigrationAssist, MigrationOutcome};
use crate::policy::PolicyGenerator;
use crate::readiness::{PollOutcome, ReadinessProber, ReadinessQuery};
use crate::release::ReleaseManager;
use crate::resource::ResourceId;
use crate::stage::{FailurePolicy, Stage, Step};

// =============================================================================
// State and reports
// =============================================================================

/// Install state machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstallState {
    /// Nothing has run yet
    NotStarted,
    /// Executing the stage with this ordinal
    Running(usize),
    /// Every stage ran
    Completed,
    /// A fatal stage failed
    Aborted {
        /// Ordinal of the failed stage
        stage: usize,
        /// Name of the failed stage
        name: String,
        /// Why it failed
        cause: String,
    },
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::Running(i) => write!(f, "running({})", i),
            Self::Completed => write!(f, "completed"),
            Self::Aborted { stage, name, .. } => write!(f, "aborted({} {})", stage, name),
        }
    }
}

/// Outcome of a single readiness wait
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadinessReport {
    /// Description of the query
    pub query: String,
    /// Result of polling
    pub outcome: PollOutcome,
}

/// How a stage ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    /// Every step succeeded
    Succeeded,
    /// Some steps failed; the stage tolerated it
    Degraded,
    /// A fatal failure; the run stopped here
    Failed(String),
}

/// What happened in one stage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageReport {
    /// Stage name
    pub name: &'static str,
    /// Stage ordinal
    pub ordinal: usize,
    /// Stage failure policy
    pub failure_policy: FailurePolicy,
    /// Outcome
    pub outcome: StageOutcome,
    /// Per-resource apply results
    pub applies: Vec<ApplyResult>,
    /// Readiness waits, preconditions first
    pub readiness: Vec<ReadinessReport>,
    /// Resources intentionally not applied
    pub skipped: Vec<String>,
    /// Tolerated failures
    pub warnings: Vec<String>,
}

impl StageReport {
    fn new(stage: &Stage) -> Self {
        Self {
            name: stage.name,
            ordinal: stage.ordinal,
            failure_policy: stage.failure_policy,
            outcome: StageOutcome::Succeeded,
            applies: Vec::new(),
            readiness: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Summary of an install run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallReport {
    /// Final state
    pub state: InstallState,
    /// One report per stage that ran
    pub stages: Vec<StageReport>,
    /// Legacy ingress migration result, if that stage ran
    pub migration: Option<MigrationOutcome>,
    /// Where the gateway can be reached, if that stage ran
    pub endpoint: Option<AccessEndpoint>,
}

impl InstallReport {
    fn new() -> Self {
        Self {
            state: InstallState::NotStarted,
            stages: Vec::new(),
            migration: None,
            endpoint: None,
        }
    }

    /// Whether every stage ran
    pub fn is_completed(&self) -> bool {
        self.state == InstallState::Completed
    }

    /// Report for the named stage
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Every tolerated failure across stages
    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .flat_map(|s| s.warnings.iter().map(String::as_str))
    }
}

// =============================================================================
// Installer
// =============================================================================

/// Runs the install stage graph against a cluster
pub struct Installer<'a> {
    config: &'a StackConfig,
    cluster: Arc<dyn ClusterApi>,
    releases: Arc<dyn ReleaseManager>,
    prober: ReadinessProber,
    applier: ResourceApplier,
}

impl<'a> Installer<'a> {
    /// Create an installer for `config`
    pub fn new(
        config: &'a StackConfig,
        cluster: Arc<dyn ClusterApi>,
        releases: Arc<dyn ReleaseManager>,
    ) -> Self {
        Self {
            config,
            prober: ReadinessProber::new(cluster.clone()),
            applier: ResourceApplier::new(cluster.clone()),
            cluster,
            releases,
        }
    }

    /// Run the canonical stage graph
    pub async fn run(&self) -> Result<InstallReport> {
        let graph = StageGraph::canonical(self.config)?;
        Ok(self.run_graph(&graph).await)
    }

    /// Run an arbitrary stage graph
    pub async fn run_graph(&self, graph: &StageGraph) -> InstallReport {
        let mut report = InstallReport::new();

        for stage in graph.stages() {
            transition(&mut report.state, InstallState::Running(stage.ordinal));
            let stage_report = self.run_stage(stage, &mut report).await;

            let failed = match &stage_report.outcome {
                StageOutcome::Failed(cause) => Some(cause.clone()),
                _ => None,
            };
            report.stages.push(stage_report);

            if let Some(cause) = failed {
                transition(
                    &mut report.state,
                    InstallState::Aborted {
                        stage: stage.ordinal,
                        name: stage.name.to_string(),
                        cause,
                    },
                );
                return report;
            }
        }

        transition(&mut report.state, InstallState::Completed);
        report
    }

    async fn run_stage(&self, stage: &Stage, install: &mut InstallReport) -> StageReport {
        let mut report = StageReport::new(stage);
        info!(stage = stage.name, ordinal = stage.ordinal, policy = %stage.failure_policy, "starting stage");

        for query in &stage.precondition {
            if let Err(msg) = self.await_query(query, &mut report).await {
                let msg = format!("precondition not met: {}", msg);
                if self.record_failure(stage, &mut report, msg) {
                    return report;
                }
            }
        }

        for step in &stage.body {
            if let Err(msg) = self.run_step(step, &mut report, install).await {
                if self.record_failure(stage, &mut report, msg) {
                    return report;
                }
            }
        }

        match report.outcome {
            StageOutcome::Succeeded => info!(stage = stage.name, "stage complete"),
            _ => warn!(stage = stage.name, warnings = report.warnings.len(), "stage completed with warnings"),
        }
        report
    }

    /// Record a step failure; returns true if the stage must stop
    fn record_failure(&self, stage: &Stage, report: &mut StageReport, msg: String) -> bool {
        match stage.failure_policy {
            FailurePolicy::Fatal => {
                error!(stage = stage.name, error = %msg, "fatal stage failed");
                report.outcome = StageOutcome::Failed(msg);
                true
            }
            FailurePolicy::WarnAndContinue => {
                warn!(stage = stage.name, warning = %msg, "continuing past failure");
                report.outcome = StageOutcome::Degraded;
                report.warnings.push(msg);
                false
            }
        }
    }

    async fn run_step(
        &self,
        step: &Step,
        report: &mut StageReport,
        install: &mut InstallReport,
    ) -> std::result::Result<(), String> {
        match step {
            Step::InstallRelease(release) => {
                info!(release = %release.name, namespace = %release.namespace, "installing release");
                self.releases
                    .install_or_upgrade(release)
                    .await
                    .map_err(|e| e.to_string())
            }
            Step::Await(query) => self.await_query(query, report).await,
            Step::Apply(definition) => {
                let result = self.applier.apply(definition).await;
                record_apply(report, result)
            }
            Step::ApplyIfAbsent(definition) => {
                let result = self.applier.apply_if_absent(definition).await;
                record_apply(report, result)
            }
            Step::ApplyPermissions => self.apply_permissions(report).await,
            Step::SuspendLegacyIngress(workload) => {
                let outcome = MigrationAssist::new(self.cluster.clone(), workload.clone())
                    .suspend()
                    .await;
                install.migration = Some(outcome);
                Ok(())
            }
            Step::ComputeAccessEndpoint => {
                let service = gateway_proxy_service(GATEWAY_RELEASE);
                let observed = self
                    .cluster
                    .service_address(&service, self.config.gateway_namespace())
                    .await;

                let (address, result) = match observed {
                    Ok(Some(address)) => (Some(address), Ok(())),
                    Ok(None) => (
                        None,
                        Err(format!(
                            "{} not found in {}, falling back to port-forward",
                            service,
                            self.config.gateway_namespace()
                        )),
                    ),
                    Err(e) => (None, Err(format!("could not observe {}: {}", service, e))),
                };
                let endpoint =
                    AccessEndpoint::from_service(self.config, GATEWAY_RELEASE, address.as_ref());
                info!(endpoint = %endpoint, "gateway access endpoint");
                install.endpoint = Some(endpoint);
                result
            }
        }
    }

    async fn await_query(
        &self,
        query: &ReadinessQuery,
        report: &mut StageReport,
    ) -> std::result::Result<(), String> {
        let outcome = self.prober.wait_for(query).await;
        let result = match &outcome {
            PollOutcome::Ready { attempts } => {
                info!(query = %query, attempts, "ready");
                Ok(())
            }
            PollOutcome::TimedOut {
                attempts,
                elapsed,
                last_error,
            } => {
                let mut msg = format!(
                    "timed out waiting for {} after {} attempts ({:?})",
                    query, attempts, elapsed
                );
                if let Some(e) = last_error {
                    msg.push_str(&format!(": {}", e));
                }
                Err(msg)
            }
        };
        report.readiness.push(ReadinessReport {
            query: query.to_string(),
            outcome,
        });
        result
    }

    async fn apply_permissions(&self, report: &mut StageReport) -> std::result::Result<(), String> {
        let generator = PolicyGenerator::for_stack(self.config);

        let supported = self
            .cluster
            .exists(&ResourceId::crd(TRAFFIC_PERMISSION_CRD))
            .await
            .map_err(|e| format!("could not check for {}: {}", TRAFFIC_PERMISSION_CRD, e))?;

        if !supported {
            for service in generator.services() {
                let name = permission_name(service);
                info!(service = %service, permission = %name, "MeshTrafficPermission not supported by cluster, skipping");
                report.skipped.push(name);
            }
            return Ok(());
        }

        let definitions = generator
            .definitions()
            .collect::<Result<Vec<_>>>()
            .map_err(|e| e.to_string())?;

        let results = self.applier.apply_all(definitions).await;
        let failures: Vec<String> = results
            .iter()
            .filter(|r| !r.succeeded())
            .map(ToString::to_string)
            .collect();
        info!(
            applied = results.len() - failures.len(),
            failed = failures.len(),
            "traffic permissions applied"
        );
        report.applies.extend(results);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }
}

fn record_apply(report: &mut StageReport, result: ApplyResult) -> std::result::Result<(), String> {
    let outcome = if result.succeeded() {
        Ok(())
    } else {
        Err(result.to_string())
    };
    report.applies.push(result);
    outcome
}

fn transition(state: &mut InstallState, next: InstallState) {
    match &next {
        InstallState::Aborted { cause, .. } => {
            error!(from = %state, to = %next, cause = %cause, "install state transition")
        }
        _ => info!(from = %state, to = %next, "install state transition"),
    }
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::ApplyOutcome;
    use crate::cluster::{MockClusterApi, ScaleOutcome};
    use crate::release::MockReleaseManager;
    use meshstack_common::Error;
    use std::time::Duration;

    fn quick(query: ReadinessQuery) -> ReadinessQuery {
        query.with_timing(Duration::from_secs(1), 2)
    }

    /// Story: a fatal stage whose wait never succeeds aborts the run and
    /// later stages never execute.
    #[tokio::test(start_paused = true)]
    async fn fatal_timeout_aborts_before_later_stages() {
        let mut cluster = MockClusterApi::new();
        cluster.expect_exists().returning(|_| Ok(false));
        let mut releases = MockReleaseManager::new();
        releases.expect_install_or_upgrade().never();

        let config = StackConfig::default();
        let graph = StageGraph::new(vec![
            Stage::new(
                "schema",
                FailurePolicy::Fatal,
                vec![Step::Await(quick(ReadinessQuery::schema("meshes.kuma.io")))],
            ),
            Stage::new(
                "gateway",
                FailurePolicy::Fatal,
                vec![Step::InstallRelease(crate::charts::gateway_release(&config))],
            ),
        ]);

        let installer = Installer::new(&config, Arc::new(cluster), Arc::new(releases));
        let report = installer.run_graph(&graph).await;

        match &report.state {
            InstallState::Aborted { stage, name, cause } => {
                assert_eq!(*stage, 1);
                assert_eq!(name, "schema");
                assert!(cause.contains("timed out waiting for schema meshes.kuma.io"));
            }
            other => panic!("expected abort, got {other:?}"),
        }
        assert_eq!(report.stages.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn warn_stage_failure_continues() {
        let mut cluster = MockClusterApi::new();
        cluster.expect_workload_available().returning(|_, _| Ok(false));
        cluster
            .expect_scale_workload()
            .returning(|_, _, r| Ok(ScaleOutcome::Scaled { replicas: r }));
        let releases = MockReleaseManager::new();

        let config = StackConfig::default();
        let graph = StageGraph::new(vec![
            Stage::new(
                "wait",
                FailurePolicy::WarnAndContinue,
                vec![Step::Await(quick(ReadinessQuery::workload("cp", "ns")))],
            ),
            Stage::new(
                "legacy-ingress",
                FailurePolicy::WarnAndContinue,
                vec![Step::SuspendLegacyIngress(config.legacy_ingress().clone())],
            ),
        ]);

        let report = Installer::new(&config, Arc::new(cluster), Arc::new(releases))
            .run_graph(&graph)
            .await;

        assert!(report.is_completed());
        assert_eq!(report.stages[0].outcome, StageOutcome::Degraded);
        assert_eq!(report.warnings().count(), 1);
        assert!(matches!(
            report.migration,
            Some(MigrationOutcome::Scaled { replicas: 0, .. })
        ));
    }

    #[tokio::test]
    async fn release_failure_in_fatal_stage_aborts() {
        let cluster = MockClusterApi::new();
        let mut releases = MockReleaseManager::new();
        releases
            .expect_install_or_upgrade()
            .returning(|r| Err(Error::release(&r.name, "chart not found")));

        let config = StackConfig::default();
        let graph = StageGraph::new(vec![Stage::new(
            "control-plane",
            FailurePolicy::Fatal,
            vec![Step::InstallRelease(crate::charts::control_plane_release(
                &config,
            ))],
        )]);

        let report = Installer::new(&config, Arc::new(cluster), Arc::new(releases))
            .run_graph(&graph)
            .await;
        assert!(matches!(
            report.state,
            InstallState::Aborted { ref cause, .. } if cause == "release error [kong-mesh]: chart not found"
        ));
    }

    #[tokio::test]
    async fn unsupported_permission_kind_skips_every_service() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_exists()
            .withf(|id| id.name == "meshtrafficpermissions.kuma.io")
            .returning(|_| Ok(false));
        cluster.expect_apply().never();

        let config = StackConfig::default();
        let graph = StageGraph::new(vec![Stage::new(
            "traffic-permissions",
            FailurePolicy::WarnAndContinue,
            vec![Step::ApplyPermissions],
        )]);

        let report = Installer::new(&config, Arc::new(cluster), Arc::new(MockReleaseManager::new()))
            .run_graph(&graph)
            .await;

        let stage = report.stage("traffic-permissions").unwrap();
        assert_eq!(stage.outcome, StageOutcome::Succeeded);
        assert_eq!(
            stage.skipped,
            ["kong-to-catalog", "kong-to-carts", "kong-to-orders", "kong-to-checkout"]
        );
    }

    #[tokio::test]
    async fn one_rejected_permission_degrades_but_applies_the_rest() {
        let mut cluster = MockClusterApi::new();
        cluster.expect_exists().returning(|_| Ok(true));
        cluster.expect_apply().times(4).returning(|def| {
            if def.id().name == "kong-to-carts" {
                Err(Error::internal("denied"))
            } else {
                Ok(())
            }
        });

        let config = StackConfig::default();
        let graph = StageGraph::new(vec![Stage::new(
            "traffic-permissions",
            FailurePolicy::WarnAndContinue,
            vec![Step::ApplyPermissions],
        )]);

        let report = Installer::new(&config, Arc::new(cluster), Arc::new(MockReleaseManager::new()))
            .run_graph(&graph)
            .await;

        assert!(report.is_completed());
        let stage = &report.stages[0];
        assert_eq!(stage.outcome, StageOutcome::Degraded);
        let applied = stage
            .applies
            .iter()
            .filter(|a| a.outcome == ApplyOutcome::Applied)
            .count();
        assert_eq!(applied, 3);
    }

    #[tokio::test]
    async fn endpoint_is_computed_even_if_service_lookup_fails() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_service_address()
            .returning(|_, _| Err(Error::internal("connection reset")));

        let config = StackConfig::default();
        let graph = StageGraph::new(vec![Stage::new(
            "access-endpoint",
            FailurePolicy::WarnAndContinue,
            vec![Step::ComputeAccessEndpoint],
        )]);

        let report = Installer::new(&config, Arc::new(cluster), Arc::new(MockReleaseManager::new()))
            .run_graph(&graph)
            .await;

        let endpoint = report.endpoint.unwrap();
        assert_eq!(endpoint.url(), "http://localhost:8080");
        assert_eq!(report.stages[0].outcome, StageOutcome::Degraded);
    }

    #[tokio::test]
    async fn missing_proxy_service_degrades_to_port_forward() {
        let mut cluster = MockClusterApi::new();
        cluster.expect_service_address().returning(|_, _| Ok(None));

        let config = StackConfig::default();
        let graph = StageGraph::new(vec![Stage::new(
            "access-endpoint",
            FailurePolicy::WarnAndContinue,
            vec![Step::ComputeAccessEndpoint],
        )]);

        let report = Installer::new(&config, Arc::new(cluster), Arc::new(MockReleaseManager::new()))
            .run_graph(&graph)
            .await;

        let endpoint = report.endpoint.unwrap();
        assert!(matches!(endpoint.method, crate::endpoint::AccessMethod::PortForward { .. }));
        let stage = &report.stages[0];
        assert_eq!(stage.outcome, StageOutcome::Degraded);
        assert_eq!(
            stage.warnings,
            ["kong-kong-proxy not found in gateway, falling back to port-forward"]
        );
    }
}
