//! Declarative resource definitions
//!
//! Every object meshstack submits is carried as a [`ResourceDefinition`]: a
//! JSON document plus the [`ResourceId`] parsed out of it. The id is the
//! idempotency key; submitting a definition whose id already exists updates
//! it in place.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use kube::discovery::ApiResource;
use serde::Serialize;
use serde_json::Value;

use meshstack_common::kube_utils::build_api_resource;
use meshstack_common::{Error, Result, LABEL_MANAGED_BY, LABEL_MANAGED_BY_MESHSTACK};

/// apiVersion of CustomResourceDefinition
const CRD_API_VERSION: &str = "apiextensions.k8s.io/v1";

/// Identity of a resource in the cluster store
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId {
    /// Full apiVersion (e.g. "kuma.io/v1alpha1")
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Name
    pub name: String,
    /// Namespace, `None` for cluster-scoped resources
    pub namespace: Option<String>,
}

impl ResourceId {
    /// Identity of a namespaced resource
    pub fn namespaced(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Identity of a cluster-scoped resource
    pub fn cluster_scoped(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    /// Identity of a CustomResourceDefinition (e.g. "meshes.kuma.io")
    pub fn crd(name: impl Into<String>) -> Self {
        Self::cluster_scoped(CRD_API_VERSION, "CustomResourceDefinition", name)
    }

    /// Identity of a Namespace
    pub fn namespace(name: impl Into<String>) -> Self {
        Self::cluster_scoped("v1", "Namespace", name)
    }

    /// The `ApiResource` used to address this id through a dynamic API
    pub fn api_resource(&self) -> ApiResource {
        build_api_resource(&self.api_version, &self.kind)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// A typed declarative document ready for server-side apply
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceDefinition {
    id: ResourceId,
    document: Value,
}

impl ResourceDefinition {
    /// Build from any serializable object carrying `apiVersion`, `kind`,
    /// and `metadata.name` (k8s-openapi types and the Kuma policy types).
    pub fn from_object<T: Serialize>(object: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(object)?)
    }

    /// Build from a raw JSON document
    pub fn from_value(document: Value) -> Result<Self> {
        let field = |path: &[&str]| -> Option<String> {
            let mut cur = &document;
            for key in path {
                cur = cur.get(key)?;
            }
            cur.as_str().map(str::to_string)
        };

        let kind = field(&["kind"])
            .ok_or_else(|| Error::serialization("resource document has no kind"))?;
        let api_version = field(&["apiVersion"])
            .ok_or_else(|| Error::serialization_for(&kind, "resource document has no apiVersion"))?;
        let name = field(&["metadata", "name"])
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::serialization_for(&kind, "resource document has no metadata.name"))?;
        let namespace = field(&["metadata", "namespace"]).filter(|ns| !ns.is_empty());

        Ok(Self {
            id: ResourceId {
                api_version,
                kind,
                name,
                namespace,
            },
            document,
        })
    }

    /// A Namespace carrying the meshstack management label plus `labels`
    pub fn namespace(name: &str, labels: BTreeMap<String, String>) -> Result<Self> {
        let mut all_labels = managed_labels();
        all_labels.extend(labels);

        let ns = Namespace {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(all_labels),
                ..Default::default()
            },
            ..Default::default()
        };
        Self::from_object(&ns)
    }

    /// A ConfigMap with the given string data
    pub fn config_map(name: &str, namespace: &str, data: BTreeMap<String, String>) -> Result<Self> {
        let cm = ConfigMap {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(managed_labels()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };
        Self::from_object(&cm)
    }

    /// Identity of this resource
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// The full document as submitted to the store
    pub fn document(&self) -> &Value {
        &self.document
    }
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        LABEL_MANAGED_BY.to_string(),
        LABEL_MANAGED_BY_MESHSTACK.to_string(),
    )])
}
