//! The canonical stage graph
//!
//! Stages run strictly in ordinal order. The ordering encodes the readiness
//! dependencies between components: the control plane's schema and admission
//! webhook must be live before any mesh object is written, and namespaces
//! must exist before the gateway is installed into one.

use std::collections::BTreeMap;

use meshstack_common::mesh::{
    gateway_proxy_service, gateway_workload, ADMISSION_PROBE_NAME, CONTROL_PLANE_WORKLOAD,
    GATEWAY_RELEASE, MESH_CRD, MESH_LABEL, SIDECAR_INJECTION_ENABLED, SIDECAR_INJECTION_LABEL,
};
use meshstack_common::policy::Mesh;
use meshstack_common::Result;

use crate::charts::{control_plane_release, gateway_release};
use crate::config::StackConfig;
use crate::gateway::declarative_config_map;
use crate::readiness::ReadinessQuery;
use crate::resource::ResourceDefinition;
use crate::stage::{FailurePolicy, Stage, Step};

/// Ordered list of install stages
#[derive(Clone, Debug, PartialEq)]
pub struct StageGraph {
    stages: Vec<Stage>,
}

impl StageGraph {
    /// Build a graph from stages, assigning ordinals in list order
    pub fn new(stages: Vec<Stage>) -> Self {
        let stages = stages
            .into_iter()
            .enumerate()
            .map(|(i, mut stage)| {
                stage.ordinal = i + 1;
                stage
            })
            .collect();
        Self { stages }
    }

    /// The ten-stage install for `config`
    pub fn canonical(config: &StackConfig) -> Result<Self> {
        let control_plane_ns = config.control_plane_namespace();
        let gateway_ns = config.gateway_namespace();
        let namespaces = [config.app_namespace(), gateway_ns];

        let control_plane_ready = vec![
            ReadinessQuery::workload(CONTROL_PLANE_WORKLOAD, control_plane_ns),
            ReadinessQuery::endpoints(CONTROL_PLANE_WORKLOAD, control_plane_ns),
        ];

        let admission_probe =
            ResourceDefinition::from_object(&Mesh::with_builtin_mtls(ADMISSION_PROBE_NAME))?;

        let create_namespaces = namespaces
            .iter()
            .map(|ns| ResourceDefinition::namespace(ns, BTreeMap::new()).map(Step::ApplyIfAbsent))
            .collect::<Result<Vec<_>>>()?;

        let membership_labels = BTreeMap::from([
            (
                SIDECAR_INJECTION_LABEL.to_string(),
                SIDECAR_INJECTION_ENABLED.to_string(),
            ),
            (MESH_LABEL.to_string(), config.mesh().to_string()),
        ]);
        let label_namespaces = namespaces
            .iter()
            .map(|ns| ResourceDefinition::namespace(ns, membership_labels.clone()).map(Step::Apply))
            .collect::<Result<Vec<_>>>()?;

        let mesh = ResourceDefinition::from_object(&Mesh::with_builtin_mtls(config.mesh()))?;

        Ok(Self::new(vec![
            Stage::new(
                "control-plane",
                FailurePolicy::Fatal,
                vec![
                    Step::InstallRelease(control_plane_release(config)),
                    Step::Await(ReadinessQuery::schema(MESH_CRD)),
                ],
            ),
            Stage::new(
                "control-plane-ready",
                FailurePolicy::WarnAndContinue,
                control_plane_ready.iter().cloned().map(Step::Await).collect(),
            ),
            Stage::new(
                "admission-gate",
                FailurePolicy::Fatal,
                vec![Step::Await(ReadinessQuery::admission(admission_probe))],
            ),
            Stage::new("namespaces", FailurePolicy::Fatal, create_namespaces),
            Stage::new(
                "mesh-membership",
                FailurePolicy::WarnAndContinue,
                label_namespaces,
            ),
            Stage::new(
                "gateway",
                FailurePolicy::Fatal,
                vec![
                    Step::Apply(declarative_config_map(config)?),
                    Step::InstallRelease(gateway_release(config)),
                    Step::Await(ReadinessQuery::workload(
                        gateway_workload(GATEWAY_RELEASE),
                        gateway_ns,
                    )),
                ],
            ),
            Stage::new(
                "mesh",
                FailurePolicy::WarnAndContinue,
                vec![Step::ApplyIfAbsent(mesh)],
            ),
            Stage::new(
                "traffic-permissions",
                FailurePolicy::WarnAndContinue,
                vec![Step::ApplyPermissions],
            )
            .with_precondition(control_plane_ready),
            Stage::new(
                "legacy-ingress",
                FailurePolicy::WarnAndContinue,
                vec![Step::SuspendLegacyIngress(config.legacy_ingress().clone())],
            ),
            Stage::new(
                "access-endpoint",
                FailurePolicy::WarnAndContinue,
                vec![
                    Step::Await(ReadinessQuery::endpoints(
                        gateway_proxy_service(GATEWAY_RELEASE),
                        gateway_ns,
                    )),
                    Step::ComputeAccessEndpoint,
                ],
            ),
        ]))
    }

    /// Stages in execution order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the graph has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Human-readable plan, one line per stage
    pub fn describe(&self) -> Vec<String> {
        self.stages
            .iter()
            .map(|stage| {
                let mut parts: Vec<String> = stage
                    .precondition
                    .iter()
                    .map(|q| format!("requires {}", q))
                    .collect();
                parts.extend(stage.body.iter().map(ToString::to_string));
                format!("{}: {}", stage, parts.join("; "))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::ReadinessTarget;

    fn graph() -> StageGraph {
        StageGraph::canonical(&StackConfig::default()).unwrap()
    }

    #[test]
    fn canonical_order_and_policies() {
        let summary: Vec<(usize, &str, FailurePolicy)> = graph()
            .stages()
            .iter()
            .map(|s| (s.ordinal, s.name, s.failure_policy))
            .collect();

        use FailurePolicy::*;
        assert_eq!(
            summary,
            [
                (1, "control-plane", Fatal),
                (2, "control-plane-ready", WarnAndContinue),
                (3, "admission-gate", Fatal),
                (4, "namespaces", Fatal),
                (5, "mesh-membership", WarnAndContinue),
                (6, "gateway", Fatal),
                (7, "mesh", WarnAndContinue),
                (8, "traffic-permissions", WarnAndContinue),
                (9, "legacy-ingress", WarnAndContinue),
                (10, "access-endpoint", WarnAndContinue),
            ]
        );
    }

    #[test]
    fn admission_gate_precedes_gateway_release() {
        let g = graph();
        let position = |pred: &dyn Fn(&Step) -> bool| {
            g.stages()
                .iter()
                .position(|s| s.body.iter().any(|step| pred(step)))
                .unwrap()
        };

        let admission = position(&|s| {
            matches!(s, Step::Await(q) if matches!(q.target, ReadinessTarget::Admission { .. }))
        });
        let gateway =
            position(&|s| matches!(s, Step::InstallRelease(r) if r.name == GATEWAY_RELEASE));
        assert!(admission < gateway);
    }

    #[test]
    fn permissions_stage_rechecks_control_plane() {
        let g = graph();
        let stage = &g.stages()[7];
        assert_eq!(stage.name, "traffic-permissions");
        assert_eq!(
            stage.precondition,
            vec![
                ReadinessQuery::workload("kong-mesh-control-plane", "kong-mesh-system"),
                ReadinessQuery::endpoints("kong-mesh-control-plane", "kong-mesh-system"),
            ]
        );
    }

    #[test]
    fn membership_labels_both_namespaces() {
        let g = graph();
        let stage = &g.stages()[4];
        let labeled: Vec<_> = stage
            .body
            .iter()
            .map(|step| match step {
                Step::Apply(def) => {
                    let labels = &def.document()["metadata"]["labels"];
                    assert_eq!(labels["kuma.io/sidecar-injection"], "enabled");
                    assert_eq!(labels["kuma.io/mesh"], "default");
                    def.id().name.clone()
                }
                other => panic!("unexpected step {other}"),
            })
            .collect();
        assert_eq!(labeled, ["the-store", "gateway"]);
    }

    #[test]
    fn describe_lists_every_stage() {
        let lines = graph().describe();
        assert_eq!(lines.len(), 10);
        assert_eq!(
            lines[0],
            "1. control-plane [fatal]: install kong-mesh (kong-mesh/kong-mesh) in kong-mesh-system; await schema meshes.kuma.io"
        );
        assert!(lines[7].starts_with(
            "8. traffic-permissions [warn]: requires workload kong-mesh-system/kong-mesh-control-plane"
        ));
    }
}
