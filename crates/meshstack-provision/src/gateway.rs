//! Kong declarative configuration
//!
//! The gateway runs DB-less; its routes come from a declarative document
//! mounted from a ConfigMap. Each roster service gets one Kong service and
//! one prefix route `/<service>` pointing at its in-cluster address.

use std::collections::BTreeMap;

use serde::Serialize;

use meshstack_common::mesh::{service_url, GATEWAY_CONFIG_KEY, GATEWAY_CONFIG_MAP};
use meshstack_common::{Error, Result};

use crate::config::StackConfig;
use crate::resource::ResourceDefinition;

/// Declarative format understood by Kong 3.x
pub const KONG_FORMAT_VERSION: &str = "3.0";

/// Root of a Kong declarative document
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct KongDeclarativeConfig {
    /// Format version
    #[serde(rename = "_format_version")]
    pub format_version: String,
    /// Upstream services
    pub services: Vec<KongService>,
}

/// A Kong service
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct KongService {
    /// Service name
    pub name: String,
    /// Upstream URL
    pub url: String,
    /// Routes into this service
    pub routes: Vec<KongRoute>,
}

/// A Kong route
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct KongRoute {
    /// Route name
    pub name: String,
    /// Path prefixes
    pub paths: Vec<String>,
    /// Strip the matched prefix before proxying
    pub strip_path: bool,
}

impl KongDeclarativeConfig {
    /// One service and route per roster entry
    pub fn for_stack(config: &StackConfig) -> Self {
        let services = config
            .services()
            .iter()
            .map(|svc| KongService {
                name: svc.clone(),
                url: service_url(svc, config.app_namespace(), config.service_port()),
                routes: vec![KongRoute {
                    name: format!("{}-route", svc),
                    paths: vec![format!("/{}", svc)],
                    strip_path: true,
                }],
            })
            .collect();

        Self {
            format_version: KONG_FORMAT_VERSION.to_string(),
            services,
        }
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::serialization_for("KongDeclarativeConfig", e.to_string()))
    }
}

/// ConfigMap carrying the declarative document, in the gateway namespace
pub fn declarative_config_map(config: &StackConfig) -> Result<ResourceDefinition> {
    let yaml = KongDeclarativeConfig::for_stack(config).to_yaml()?;
    let data = BTreeMap::from([(GATEWAY_CONFIG_KEY.to_string(), yaml)]);
    ResourceDefinition::config_map(GATEWAY_CONFIG_MAP, config.gateway_namespace(), data)
}
