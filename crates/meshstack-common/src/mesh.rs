//! Service mesh constants for Kong Mesh (Kuma) + Kong Gateway
//!
//! Single source of truth for the names, labels, and annotations shared by
//! the install stages, the policy generator, and the rollback path.

// =============================================================================
// Control plane
// =============================================================================

/// Helm release name of the control plane
pub const CONTROL_PLANE_RELEASE: &str = "kong-mesh";

/// Chart reference for the control plane (repo alias / chart)
pub const CONTROL_PLANE_CHART: &str = "kong-mesh/kong-mesh";

/// Helm repository alias for the control-plane chart
pub const CONTROL_PLANE_REPO_NAME: &str = "kong-mesh";

/// Helm repository URL for the control-plane chart
pub const CONTROL_PLANE_REPO_URL: &str = "https://kong.github.io/kong-mesh-charts";

/// Default namespace the control plane is installed into
pub const CONTROL_PLANE_NAMESPACE: &str = "kong-mesh-system";

/// Control-plane Deployment (and Service) name created by the chart
pub const CONTROL_PLANE_WORKLOAD: &str = "kong-mesh-control-plane";

/// CRD whose presence proves the control-plane schema is registered
pub const MESH_CRD: &str = "meshes.kuma.io";

/// CRD for fine-grained traffic permissions (absent on older releases)
pub const TRAFFIC_PERMISSION_CRD: &str = "meshtrafficpermissions.kuma.io";

/// Name of the synthetic object used to probe the admission webhook.
///
/// Only ever submitted as a server-side dry run; never persisted.
pub const ADMISSION_PROBE_NAME: &str = "meshstack-admission-probe";

// =============================================================================
// Gateway
// =============================================================================

/// Helm release name of the gateway
pub const GATEWAY_RELEASE: &str = "kong";

/// Chart reference for the gateway
pub const GATEWAY_CHART: &str = "kong/kong";

/// Helm repository alias for the gateway chart
pub const GATEWAY_REPO_NAME: &str = "kong";

/// Helm repository URL for the gateway chart
pub const GATEWAY_REPO_URL: &str = "https://charts.konghq.com";

/// ConfigMap holding the gateway's declarative configuration
pub const GATEWAY_CONFIG_MAP: &str = "kong-declarative-config";

/// Key of the declarative document inside the ConfigMap
pub const GATEWAY_CONFIG_KEY: &str = "kong.yml";

/// Deployment created by the gateway chart for a release
pub fn gateway_workload(release: &str) -> String {
    format!("{}-kong", release)
}

/// Proxy Service created by the gateway chart for a release.
///
/// Downstream tooling locates the gateway by this name.
pub fn gateway_proxy_service(release: &str) -> String {
    format!("{}-kong-proxy", release)
}

// =============================================================================
// Legacy ingress
// =============================================================================

/// Deployment of the competing ingress controller scaled down during install
pub const LEGACY_INGRESS_WORKLOAD: &str = "ingress-nginx-controller";

/// Namespace of the competing ingress controller
pub const LEGACY_INGRESS_NAMESPACE: &str = "ingress-nginx";

// =============================================================================
// Labels, annotations, tags
// =============================================================================

/// Namespace label enabling sidecar injection
pub const SIDECAR_INJECTION_LABEL: &str = "kuma.io/sidecar-injection";

/// Value for SIDECAR_INJECTION_LABEL enabling injection
pub const SIDECAR_INJECTION_ENABLED: &str = "enabled";

/// Label binding a namespace or policy to a mesh
pub const MESH_LABEL: &str = "kuma.io/mesh";

/// Pod annotation marking a delegated gateway
pub const GATEWAY_ANNOTATION: &str = "kuma.io/gateway";

/// Dataplane tag carrying the Kubernetes namespace of a workload
pub const NAMESPACE_TAG: &str = "k8s.kuma.io/namespace";

/// Mesh used when no identity is configured
pub const DEFAULT_MESH: &str = "default";

// =============================================================================
// Naming Helpers
// =============================================================================

/// Name of the traffic permission letting the gateway reach a service.
pub fn permission_name(service: &str) -> String {
    format!("kong-to-{}", service)
}

/// In-cluster URL of a roster service.
pub fn service_url(service: &str, namespace: &str, port: u16) -> String {
    format!("http://{}.{}.svc.cluster.local:{}", service, namespace, port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_name_format() {
        assert_eq!(permission_name("catalog"), "kong-to-catalog");
    }

    #[test]
    fn gateway_names_derive_from_release() {
        assert_eq!(gateway_workload("kong"), "kong-kong");
        assert_eq!(gateway_proxy_service("kong"), "kong-kong-proxy");
    }

    #[test]
    fn service_url_format() {
        assert_eq!(
            service_url("carts", "the-store", 80),
            "http://carts.the-store.svc.cluster.local:80"
        );
    }

    #[test]
    fn probe_name_is_distinct_from_default_mesh() {
        assert_ne!(ADMISSION_PROBE_NAME, DEFAULT_MESH);
    }
}
