//! Release specifications for the control plane and the gateway

use serde_json::{json, Value};

use meshstack_common::mesh::{
    CONTROL_PLANE_CHART, CONTROL_PLANE_RELEASE, CONTROL_PLANE_REPO_NAME, CONTROL_PLANE_REPO_URL,
    GATEWAY_ANNOTATION, GATEWAY_CHART, GATEWAY_CONFIG_MAP, GATEWAY_RELEASE, GATEWAY_REPO_NAME,
    GATEWAY_REPO_URL,
};

use crate::config::StackConfig;
use crate::release::{ChartRepository, ReleaseSpec};

/// Kong Mesh control plane with chart defaults
pub fn control_plane_release(config: &StackConfig) -> ReleaseSpec {
    ReleaseSpec {
        name: CONTROL_PLANE_RELEASE.to_string(),
        chart: CONTROL_PLANE_CHART.to_string(),
        namespace: config.control_plane_namespace().to_string(),
        repository: ChartRepository {
            name: CONTROL_PLANE_REPO_NAME.to_string(),
            url: CONTROL_PLANE_REPO_URL.to_string(),
        },
        values: json!({}),
    }
}

/// Kong Gateway in DB-less mode, delegated into the mesh
pub fn gateway_release(config: &StackConfig) -> ReleaseSpec {
    ReleaseSpec {
        name: GATEWAY_RELEASE.to_string(),
        chart: GATEWAY_CHART.to_string(),
        namespace: config.gateway_namespace().to_string(),
        repository: ChartRepository {
            name: GATEWAY_REPO_NAME.to_string(),
            url: GATEWAY_REPO_URL.to_string(),
        },
        values: gateway_values(),
    }
}

/// Values for the gateway chart.
///
/// The proxy pods carry the delegated-gateway annotation so the sidecar
/// runs in gateway mode; routes come from the declarative ConfigMap.
pub fn gateway_values() -> Value {
    json!({
        "ingressController": { "enabled": false },
        "env": { "database": "off" },
        "dblessConfig": { "configMap": GATEWAY_CONFIG_MAP },
        "admin": { "enabled": false },
        "proxy": { "type": "NodePort" },
        "podAnnotations": { GATEWAY_ANNOTATION: "enabled" },
    })
}
