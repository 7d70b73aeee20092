//! Kuma policy types
//!
//! Types for generating Kong Mesh resources:
//! - Mesh: mesh-wide mTLS settings
//! - MeshTrafficPermission: which sources may reach a destination

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::kube_utils::{HasApiResource, ObjectMeta};
use crate::mesh::{MESH_LABEL, NAMESPACE_TAG};

/// Kuma API version shared by every resource in this module
const KUMA_API_VERSION: &str = "kuma.io/v1alpha1";

/// Builtin CA backend name used by the baseline mesh
pub const BUILTIN_CA_BACKEND: &str = "ca-1";

// =============================================================================
// Mesh
// =============================================================================

/// Kuma Mesh, a cluster-scoped security/routing domain
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mesh {
    /// API version
    #[serde(default = "Mesh::api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "Mesh::kind")]
    pub kind: String,
    /// Metadata (cluster-scoped, no namespace)
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: MeshSpec,
}

impl HasApiResource for Mesh {
    const API_VERSION: &'static str = KUMA_API_VERSION;
    const KIND: &'static str = "Mesh";
}

impl Mesh {
    fn api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Create a new Mesh
    pub fn new(name: impl Into<String>, spec: MeshSpec) -> Self {
        Self {
            api_version: Self::api_version(),
            kind: Self::kind(),
            metadata: ObjectMeta::cluster_scoped(name),
            spec,
        }
    }

    /// The baseline mesh: mTLS enabled with the builtin CA.
    pub fn with_builtin_mtls(name: impl Into<String>) -> Self {
        Self::new(
            name,
            MeshSpec {
                mtls: Some(MtlsSpec {
                    enabled_backend: BUILTIN_CA_BACKEND.to_string(),
                    backends: vec![MtlsBackend {
                        name: BUILTIN_CA_BACKEND.to_string(),
                        type_: "builtin".to_string(),
                    }],
                }),
            },
        )
    }
}

/// Mesh spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MeshSpec {
    /// mTLS configuration (absent = plaintext mesh)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtls: Option<MtlsSpec>,
}

/// Mesh mTLS configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MtlsSpec {
    /// Name of the backend in use
    pub enabled_backend: String,
    /// Available certificate backends
    pub backends: Vec<MtlsBackend>,
}

/// Certificate authority backend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MtlsBackend {
    /// Backend name
    pub name: String,
    /// Backend type: builtin, provided, vault
    #[serde(rename = "type")]
    pub type_: String,
}

// =============================================================================
// MeshTrafficPermission
// =============================================================================

/// Kuma MeshTrafficPermission
///
/// Applied to a destination via `targetRef`; each `from` entry selects the
/// sources allowed (or denied) to reach it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshTrafficPermission {
    /// API version
    #[serde(default = "MeshTrafficPermission::api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "MeshTrafficPermission::kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: MeshTrafficPermissionSpec,
}

impl HasApiResource for MeshTrafficPermission {
    const API_VERSION: &'static str = KUMA_API_VERSION;
    const KIND: &'static str = "MeshTrafficPermission";
}

impl MeshTrafficPermission {
    fn api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Create a new MeshTrafficPermission
    pub fn new(metadata: ObjectMeta, spec: MeshTrafficPermissionSpec) -> Self {
        Self {
            api_version: Self::api_version(),
            kind: Self::kind(),
            metadata,
            spec,
        }
    }

    /// Allow every workload in `source_namespace` to reach `service` in
    /// `service_namespace`.
    ///
    /// The policy itself lives in `policy_namespace` and is bound to `mesh`
    /// through the `kuma.io/mesh` label.
    pub fn allow_namespace_to_service(
        name: impl Into<String>,
        policy_namespace: impl Into<String>,
        mesh: &str,
        service: impl Into<String>,
        service_namespace: impl Into<String>,
        source_namespace: impl Into<String>,
    ) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(NAMESPACE_TAG.to_string(), source_namespace.into());

        Self::new(
            ObjectMeta::new(name, policy_namespace).with_label(MESH_LABEL, mesh),
            MeshTrafficPermissionSpec {
                target_ref: PolicyTargetRef::mesh_service(service, service_namespace),
                from: vec![PermissionFrom {
                    target_ref: PolicyTargetRef::mesh_subset(tags),
                    default: PermissionConf {
                        action: PermissionAction::Allow,
                    },
                }],
            },
        )
    }
}

/// MeshTrafficPermission spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshTrafficPermissionSpec {
    /// Destination the policy applies to
    pub target_ref: PolicyTargetRef,
    /// Source rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<PermissionFrom>,
}

/// Kuma targetRef
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PolicyTargetRef {
    /// Kind: Mesh, MeshSubset, MeshService
    pub kind: String,
    /// Referenced resource name (MeshService)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Namespace of the referenced resource (MeshService)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Dataplane tags (MeshSubset)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl PolicyTargetRef {
    /// Reference a MeshService by name and namespace
    pub fn mesh_service(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind: "MeshService".to_string(),
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            tags: BTreeMap::new(),
        }
    }

    /// Reference all dataplanes carrying the given tags
    pub fn mesh_subset(tags: BTreeMap<String, String>) -> Self {
        Self {
            kind: "MeshSubset".to_string(),
            name: None,
            namespace: None,
            tags,
        }
    }
}

/// A `from` rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionFrom {
    /// Sources this rule matches
    pub target_ref: PolicyTargetRef,
    /// Configuration applied to matching sources
    pub default: PermissionConf,
}

/// Permission configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PermissionConf {
    /// Action for matching traffic
    pub action: PermissionAction,
}

/// Permission action
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PermissionAction {
    /// Allow traffic
    Allow,
    /// Deny traffic
    Deny,
    /// Allow traffic and log a warning
    AllowWithShadowDeny,
}
