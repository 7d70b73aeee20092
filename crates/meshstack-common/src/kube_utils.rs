//! Shared Kubernetes utilities using kube-rs
//!
//! Provides the small set of kubectl-equivalent building blocks meshstack
//! needs: client construction, `ApiResource` building for dynamic objects,
//! and condition inspection for workloads.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};

use crate::Error;

// =============================================================================
// ObjectMeta - Canonical metadata for generated resources
// =============================================================================

/// Standard Kubernetes ObjectMeta for generated resources.
///
/// Used by the typed Kuma policy resources as the unified metadata
/// representation. Automatically adds the meshstack management labels on
/// construction. Cluster-scoped resources leave `namespace` empty.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace (empty for cluster-scoped resources)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create new namespaced metadata with standard meshstack labels
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let name = name.into();
        let mut labels = BTreeMap::new();
        labels.insert(crate::LABEL_NAME.to_string(), name.clone());
        labels.insert(
            crate::LABEL_MANAGED_BY.to_string(),
            crate::LABEL_MANAGED_BY_MESHSTACK.to_string(),
        );
        Self {
            name,
            namespace: namespace.into(),
            labels,
            annotations: BTreeMap::new(),
        }
    }

    /// Create cluster-scoped metadata with standard meshstack labels
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self::new(name, String::new())
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// HasApiResource Trait
// =============================================================================

/// Trait for types that have a known API group, version, and kind.
///
/// Implement this for CRD types to derive their `ApiResource` from their
/// internal constants, ensuring consistency between serialization and API calls.
///
/// # Example
/// ```ignore
/// impl HasApiResource for MeshTrafficPermission {
///     const API_VERSION: &'static str = "kuma.io/v1alpha1";
///     const KIND: &'static str = "MeshTrafficPermission";
/// }
///
/// let ar = MeshTrafficPermission::api_resource();
/// ```
pub trait HasApiResource {
    /// Full API version (e.g., "kuma.io/v1alpha1", "v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "MeshTrafficPermission")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Build an `ApiResource` from an apiVersion string and kind.
///
/// The version is used exactly as given; no discovery round-trip is made.
///
/// ```ignore
/// let ar = build_api_resource("apps/v1", "Deployment");
/// let api: Api<DynamicObject> = Api::namespaced_with(client, "default", &ar);
/// ```
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Parse apiVersion into (group, version)
///
/// # Examples
/// ```
/// use meshstack_common::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("kuma.io/v1alpha1");
/// assert_eq!(group, "kuma.io");
/// assert_eq!(version, "v1alpha1");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind
///
/// Covers the kinds meshstack touches (core, apiextensions, Kuma) with
/// simple English rules: `Mesh` -> `meshes`, `Policy` -> `policies`.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

// =============================================================================
// Conditions
// =============================================================================

/// The "Available" condition type for deployments
pub const CONDITION_AVAILABLE: &str = "Available";
/// The "True" status value for conditions
pub const STATUS_TRUE: &str = "True";

/// Trait for types that have condition-like fields (type and status)
pub trait HasConditionFields {
    /// Get the condition type field value
    fn type_field(&self) -> &str;
    /// Get the condition status field value
    fn status_field(&self) -> &str;
}

impl HasConditionFields for k8s_openapi::api::apps::v1::DeploymentCondition {
    fn type_field(&self) -> &str {
        &self.type_
    }
    fn status_field(&self) -> &str {
        &self.status
    }
}

/// Check if a Kubernetes condition of the given type has status "True"
///
/// # Arguments
/// * `conditions` - Optional slice of conditions (e.g., from status.conditions)
/// * `condition_type` - The condition type to check (e.g., "Available")
pub fn has_condition<T>(conditions: Option<&[T]>, condition_type: &str) -> bool
where
    T: HasConditionFields,
{
    conditions
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_field() == condition_type && c.status_field() == STATUS_TRUE)
        })
        .unwrap_or(false)
}

// =============================================================================
// Client construction
// =============================================================================

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an optional kubeconfig path with default timeouts
///
/// With no path, the usual inference chain applies (`KUBECONFIG`,
/// `~/.kube/config`, in-cluster service account).
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };

    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}
