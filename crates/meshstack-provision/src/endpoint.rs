//! Access endpoint summary
//!
//! Computed from the observed gateway proxy Service at the end of each
//! install. A NodePort with a reachable node address is used directly;
//! anything else falls back to a local port-forward.

use std::fmt;

use meshstack_common::mesh::gateway_proxy_service;

use crate::cluster::ServiceAddress;
use crate::config::StackConfig;

/// Host used for the port-forward path
const LOCALHOST: &str = "localhost";

/// How an operator reaches the gateway
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessMethod {
    /// Through `kubectl port-forward`
    PortForward {
        /// The exact command to run
        command: String,
    },
    /// Directly via a node's NodePort
    NodePort,
}

/// Where the gateway can be reached from outside the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessEndpoint {
    /// URL scheme
    pub scheme: String,
    /// Host
    pub host: String,
    /// Port
    pub port: u16,
    /// Access method
    pub method: AccessMethod,
}

impl AccessEndpoint {
    /// Derive the endpoint from the proxy Service address, if one was observed
    pub fn from_service(
        config: &StackConfig,
        gateway_release: &str,
        address: Option<&ServiceAddress>,
    ) -> Self {
        if let Some(ServiceAddress {
            node_port: Some(node_port),
            node_ip: Some(node_ip),
            ..
        }) = address
        {
            return Self {
                scheme: "http".to_string(),
                host: node_ip.clone(),
                port: *node_port,
                method: AccessMethod::NodePort,
            };
        }

        let remote_port = address
            .map(|a| a.port)
            .filter(|p| *p != 0)
            .unwrap_or(config.service_port());
        let command = format!(
            "kubectl port-forward -n {} svc/{} {}:{}",
            config.gateway_namespace(),
            gateway_proxy_service(gateway_release),
            config.local_port(),
            remote_port
        );

        Self {
            scheme: "http".to_string(),
            host: LOCALHOST.to_string(),
            port: config.local_port(),
            method: AccessMethod::PortForward { command },
        }
    }

    /// Base URL of the gateway
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl fmt::Display for AccessEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            AccessMethod::NodePort => write!(f, "{} (node port)", self.url()),
            AccessMethod::PortForward { command } => {
                write!(f, "{} (run: {})", self.url(), command)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_port_with_node_ip_is_used_directly() {
        let address = ServiceAddress {
            cluster_ip: Some("10.96.0.10".to_string()),
            port: 80,
            node_port: Some(30080),
            node_ip: Some("172.18.0.2".to_string()),
        };
        let endpoint = AccessEndpoint::from_service(&StackConfig::default(), "kong", Some(&address));
        assert_eq!(endpoint.method, AccessMethod::NodePort);
        assert_eq!(endpoint.url(), "http://172.18.0.2:30080");
    }

    #[test]
    fn missing_service_falls_back_to_port_forward() {
        let endpoint = AccessEndpoint::from_service(&StackConfig::default(), "kong", None);
        assert_eq!(endpoint.url(), "http://localhost:8080");
        assert_eq!(
            endpoint.method,
            AccessMethod::PortForward {
                command: "kubectl port-forward -n gateway svc/kong-kong-proxy 8080:80".to_string()
            }
        );
    }

    #[test]
    fn node_port_without_node_ip_falls_back() {
        let address = ServiceAddress {
            cluster_ip: None,
            port: 8000,
            node_port: Some(30080),
            node_ip: None,
        };
        let endpoint = AccessEndpoint::from_service(&StackConfig::default(), "kong", Some(&address));
        assert!(endpoint.to_string().contains("svc/kong-kong-proxy 8080:8000"));
    }
}
