//! In-memory cluster for orchestrator tests
//!
//! `FakeCluster` implements both the resource API and the release manager so
//! that installing a chart makes its workloads, CRDs, and endpoints appear
//! the way they would on a real cluster.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use meshstack_common::mesh::{
    gateway_proxy_service, gateway_workload, CONTROL_PLANE_RELEASE, CONTROL_PLANE_WORKLOAD,
    GATEWAY_RELEASE, LEGACY_INGRESS_NAMESPACE, LEGACY_INGRESS_WORKLOAD, MESH_CRD,
    TRAFFIC_PERMISSION_CRD,
};
use meshstack_common::{Error, Result};
use meshstack_provision::{
    ClusterApi, ReleaseManager, ReleaseSpec, ResourceDefinition, ResourceId, ScaleOutcome,
    ServiceAddress, UninstallOutcome,
};

/// Node IP reported for NodePort services
pub const NODE_IP: &str = "172.18.0.2";
/// NodePort allocated to the gateway proxy
pub const PROXY_NODE_PORT: u16 = 30080;

/// Observable cluster state, compared before and after runs
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Stored objects
    pub objects: BTreeMap<ResourceId, Value>,
    /// Installed releases as (namespace, name)
    pub releases: BTreeSet<(String, String)>,
    /// Deployment replica counts keyed by (namespace, name)
    pub deployments: BTreeMap<(String, String), i32>,
}

#[derive(Default)]
struct State {
    snapshot: Snapshot,
    release_attempts: Vec<String>,
    admission_open: bool,
    permission_kind_supported: bool,
    rejected: BTreeSet<String>,
}

/// In-memory cluster plus helm
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    /// A healthy cluster with no prior installs
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                admission_open: true,
                permission_kind_supported: true,
                ..Default::default()
            }),
        }
    }

    /// Add a running legacy ingress controller
    pub fn with_legacy_ingress(self) -> Self {
        self.lock().snapshot.deployments.insert(
            (
                LEGACY_INGRESS_NAMESPACE.to_string(),
                LEGACY_INGRESS_WORKLOAD.to_string(),
            ),
            1,
        );
        self
    }

    /// Admission webhook rejects every mesh write
    pub fn with_admission_closed(self) -> Self {
        self.lock().admission_open = false;
        self
    }

    /// Control plane predates MeshTrafficPermission
    pub fn without_permission_kind(self) -> Self {
        self.lock().permission_kind_supported = false;
        self
    }

    /// Reject applies of the named resource
    pub fn rejecting(self, name: &str) -> Self {
        self.lock().rejected.insert(name.to_string());
        self
    }

    /// Seed an object as if someone else had created it
    pub fn with_object(self, document: Value) -> Self {
        let definition = ResourceDefinition::from_value(document).unwrap();
        self.lock()
            .snapshot
            .objects
            .insert(definition.id().clone(), definition.document().clone());
        self
    }

    /// Stored document for `kind`/`name`, if any
    pub fn object(&self, kind: &str, name: &str) -> Option<Value> {
        self.objects_of_kind(kind)
            .into_iter()
            .find(|(id, _)| id.name == name)
            .map(|(_, doc)| doc)
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot.clone()
    }

    /// Release names passed to install_or_upgrade, in order
    pub fn release_attempts(&self) -> Vec<String> {
        self.lock().release_attempts.clone()
    }

    /// Stored objects of a kind
    pub fn objects_of_kind(&self, kind: &str) -> Vec<(ResourceId, Value)> {
        self.lock()
            .snapshot
            .objects
            .iter()
            .filter(|(id, _)| id.kind == kind)
            .map(|(id, v)| (id.clone(), v.clone()))
            .collect()
    }

    /// Replica count of a deployment, if it exists
    pub fn replicas(&self, name: &str, namespace: &str) -> Option<i32> {
        self.lock()
            .snapshot
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl State {
    fn has_release(&self, name: &str) -> bool {
        self.snapshot.releases.iter().any(|(_, n)| n == name)
    }

    fn release_namespace(&self, name: &str) -> Option<String> {
        self.snapshot
            .releases
            .iter()
            .find(|(_, n)| n == name)
            .map(|(ns, _)| ns.clone())
    }

    fn check_admission(&self, definition: &ResourceDefinition) -> Result<()> {
        if definition.id().api_version.starts_with("kuma.io/") && !self.admission_open {
            return Err(Error::internal_with_context(
                "admission",
                "failed calling webhook \"mesh.validator.kuma-admission.kuma.io\"",
            ));
        }
        Ok(())
    }
}

/// Deployments a chart release brings up
fn release_workloads(release: &str) -> Vec<String> {
    match release {
        CONTROL_PLANE_RELEASE => vec![CONTROL_PLANE_WORKLOAD.to_string()],
        GATEWAY_RELEASE => vec![gateway_workload(GATEWAY_RELEASE)],
        _ => Vec::new(),
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn apply(&self, definition: &ResourceDefinition) -> Result<()> {
        let mut state = self.lock();
        state.check_admission(definition)?;
        if state.rejected.contains(&definition.id().name) {
            return Err(Error::internal_with_context("apply", "rejected by policy"));
        }
        state
            .snapshot
            .objects
            .insert(definition.id().clone(), definition.document().clone());
        Ok(())
    }

    async fn dry_run_apply(&self, definition: &ResourceDefinition) -> Result<()> {
        self.lock().check_admission(definition)
    }

    async fn exists(&self, id: &ResourceId) -> Result<bool> {
        let state = self.lock();
        if id.kind == "CustomResourceDefinition" {
            let control_plane = state.has_release(CONTROL_PLANE_RELEASE);
            return Ok(match id.name.as_str() {
                MESH_CRD => control_plane,
                TRAFFIC_PERMISSION_CRD => control_plane && state.permission_kind_supported,
                _ => false,
            });
        }
        Ok(state.snapshot.objects.contains_key(id))
    }

    async fn workload_available(&self, name: &str, namespace: &str) -> Result<bool> {
        Ok(self.replicas(name, namespace).is_some_and(|r| r > 0))
    }

    async fn endpoint_count(&self, service: &str, namespace: &str) -> Result<usize> {
        let state = self.lock();
        let backing = if service == CONTROL_PLANE_WORKLOAD {
            Some(CONTROL_PLANE_RELEASE)
        } else if service == gateway_proxy_service(GATEWAY_RELEASE) {
            Some(GATEWAY_RELEASE)
        } else {
            None
        };

        Ok(match backing {
            Some(release) if state.release_namespace(release).as_deref() == Some(namespace) => 1,
            _ => 0,
        })
    }

    async fn scale_workload(
        &self,
        name: &str,
        namespace: &str,
        replicas: i32,
    ) -> Result<ScaleOutcome> {
        let mut state = self.lock();
        match state
            .snapshot
            .deployments
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            Some(current) => {
                *current = replicas;
                Ok(ScaleOutcome::Scaled { replicas })
            }
            None => Ok(ScaleOutcome::NotFound),
        }
    }

    async fn service_address(
        &self,
        service: &str,
        namespace: &str,
    ) -> Result<Option<ServiceAddress>> {
        let state = self.lock();
        let is_proxy = service == gateway_proxy_service(GATEWAY_RELEASE)
            && state.release_namespace(GATEWAY_RELEASE).as_deref() == Some(namespace);

        Ok(is_proxy.then(|| ServiceAddress {
            cluster_ip: Some("10.96.12.7".to_string()),
            port: 80,
            node_port: Some(PROXY_NODE_PORT),
            node_ip: Some(NODE_IP.to_string()),
        }))
    }
}

#[async_trait]
impl ReleaseManager for FakeCluster {
    async fn install_or_upgrade(&self, release: &ReleaseSpec) -> Result<()> {
        let mut state = self.lock();
        state.release_attempts.push(release.name.clone());
        state
            .snapshot
            .releases
            .insert((release.namespace.clone(), release.name.clone()));
        for workload in release_workloads(&release.name) {
            state
                .snapshot
                .deployments
                .insert((release.namespace.clone(), workload), 1);
        }
        Ok(())
    }

    async fn uninstall(&self, name: &str, namespace: &str) -> Result<UninstallOutcome> {
        let mut state = self.lock();
        let key = (namespace.to_string(), name.to_string());
        if !state.snapshot.releases.remove(&key) {
            return Ok(UninstallOutcome::NotFound);
        }
        for workload in release_workloads(name) {
            state
                .snapshot
                .deployments
                .remove(&(namespace.to_string(), workload));
        }
        Ok(UninstallOutcome::Removed)
    }
}
