//! Cluster resource API
//!
//! [`ClusterApi`] is the seam between the orchestrator and the cluster store.
//! [`KubeCluster`] is the production implementation over kube-rs: every
//! write is a forced server-side apply under the `meshstack` field manager, so
//! re-submitting an existing definition updates it in place.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Endpoints, Node, Service};
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use meshstack_common::kube_utils::{has_condition, CONDITION_AVAILABLE};
use meshstack_common::{Error, Result, FIELD_MANAGER};

use crate::resource::{ResourceDefinition, ResourceId};

/// Node address type reachable from inside the cluster network
const NODE_INTERNAL_IP: &str = "InternalIP";

/// Outcome of scaling a workload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleOutcome {
    /// Replica count was set
    Scaled {
        /// Requested replica count
        replicas: i32,
    },
    /// The workload does not exist
    NotFound,
}

/// Observed address of a Service
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceAddress {
    /// ClusterIP, if allocated
    pub cluster_ip: Option<String>,
    /// First service port
    pub port: u16,
    /// NodePort of the first service port, if the service exposes one
    pub node_port: Option<u16>,
    /// Internal IP of a cluster node, looked up only for NodePort services
    pub node_ip: Option<String>,
}

/// Trait abstracting the cluster resource store
///
/// Allows the orchestrator to run against an in-memory store in tests while
/// using the real API server in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Create or update a resource (server-side apply, forced)
    async fn apply(&self, definition: &ResourceDefinition) -> Result<()>;

    /// Submit a resource for validation and admission without persisting it
    async fn dry_run_apply(&self, definition: &ResourceDefinition) -> Result<()>;

    /// Whether a resource with this identity exists
    async fn exists(&self, id: &ResourceId) -> Result<bool>;

    /// Whether the named Deployment reports `Available=True`
    ///
    /// A missing Deployment is "not available", not an error.
    async fn workload_available(&self, name: &str, namespace: &str) -> Result<bool>;

    /// Number of ready endpoint addresses behind a Service
    async fn endpoint_count(&self, service: &str, namespace: &str) -> Result<usize>;

    /// Set a Deployment's replica count
    async fn scale_workload(
        &self,
        name: &str,
        namespace: &str,
        replicas: i32,
    ) -> Result<ScaleOutcome>;

    /// Observed address of a Service, `None` if it does not exist
    async fn service_address(&self, service: &str, namespace: &str)
        -> Result<Option<ServiceAddress>>;
}

/// Production [`ClusterApi`] backed by a kube client
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, id: &ResourceId) -> Api<DynamicObject> {
        let ar = id.api_resource();
        match &id.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }

    async fn first_node_internal_ip(&self) -> Result<Option<String>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default().limit(1)).await?;

        Ok(list
            .items
            .iter()
            .filter_map(|n| n.status.as_ref()?.addresses.as_ref())
            .flatten()
            .find(|a| a.type_ == NODE_INTERNAL_IP)
            .map(|a| a.address.clone()))
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn apply(&self, definition: &ResourceDefinition) -> Result<()> {
        let id = definition.id();
        let api = self.dynamic_api(id);
        let params = PatchParams::apply(FIELD_MANAGER).force();

        api.patch(&id.name, &params, &Patch::Apply(definition.document()))
            .await?;
        debug!(resource = %id, "applied");
        Ok(())
    }

    async fn dry_run_apply(&self, definition: &ResourceDefinition) -> Result<()> {
        let id = definition.id();
        let api = self.dynamic_api(id);
        let mut params = PatchParams::apply(FIELD_MANAGER).force();
        params.dry_run = true;

        api.patch(&id.name, &params, &Patch::Apply(definition.document()))
            .await?;
        Ok(())
    }

    async fn exists(&self, id: &ResourceId) -> Result<bool> {
        Ok(self.dynamic_api(id).get_opt(&id.name).await?.is_some())
    }

    async fn workload_available(&self, name: &str, namespace: &str) -> Result<bool> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let Some(deployment) = deployments.get_opt(name).await? else {
            return Ok(false);
        };

        let conditions = deployment
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_deref());
        Ok(has_condition(conditions, CONDITION_AVAILABLE))
    }

    async fn endpoint_count(&self, service: &str, namespace: &str) -> Result<usize> {
        let endpoints: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let Some(ep) = endpoints.get_opt(service).await? else {
            return Ok(0);
        };

        Ok(ep
            .subsets
            .iter()
            .flatten()
            .map(|s| s.addresses.as_ref().map_or(0, Vec::len))
            .sum())
    }

    async fn scale_workload(
        &self,
        name: &str,
        namespace: &str,
        replicas: i32,
    ) -> Result<ScaleOutcome> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });

        let patched = deployments
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(Error::from);
        scale_outcome(patched.map(|_| ()), replicas)
    }

    async fn service_address(
        &self,
        service: &str,
        namespace: &str,
    ) -> Result<Option<ServiceAddress>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let Some(svc) = services.get_opt(service).await? else {
            return Ok(None);
        };

        let spec = svc.spec.unwrap_or_default();
        let first_port = spec.ports.as_ref().and_then(|p| p.first());
        let port = first_port
            .and_then(|p| u16::try_from(p.port).ok())
            .unwrap_or_default();
        let node_port = first_port
            .and_then(|p| p.node_port)
            .and_then(|np| u16::try_from(np).ok());

        let node_ip = match node_port {
            Some(_) => self.first_node_internal_ip().await?,
            None => None,
        };

        Ok(Some(ServiceAddress {
            cluster_ip: spec.cluster_ip.filter(|ip| ip != "None"),
            port,
            node_port,
            node_ip,
        }))
    }
}

/// A missing deployment is an outcome, not an error
fn scale_outcome(patched: Result<()>, replicas: i32) -> Result<ScaleOutcome> {
    match patched {
        Ok(()) => Ok(ScaleOutcome::Scaled { replicas }),
        Err(e) if e.is_not_found() => Ok(ScaleOutcome::NotFound),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, reason: &str) -> Error {
        Error::from(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("deployments.apps \"ingress-nginx-controller\": {}", reason),
            reason: reason.to_string(),
            code,
        }))
    }

    #[test]
    fn scaled_reports_requested_replicas() {
        assert_eq!(
            scale_outcome(Ok(()), 0).unwrap(),
            ScaleOutcome::Scaled { replicas: 0 }
        );
    }

    #[test]
    fn missing_deployment_is_not_found() {
        assert_eq!(
            scale_outcome(Err(api_error(404, "NotFound")), 1).unwrap(),
            ScaleOutcome::NotFound
        );
    }

    #[test]
    fn other_api_errors_propagate() {
        let err = scale_outcome(Err(api_error(403, "Forbidden")), 1).unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("Forbidden"));
    }
}
