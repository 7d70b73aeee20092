//! Stack configuration
//!
//! `StackConfig` is built once at process start and passed by reference into
//! every component. All invariants are checked in [`StackConfigBuilder::build`];
//! a constructed value is always valid and never changes afterwards.

use meshstack_common::mesh::{
    CONTROL_PLANE_NAMESPACE, DEFAULT_MESH, LEGACY_INGRESS_NAMESPACE, LEGACY_INGRESS_WORKLOAD,
};
use meshstack_common::{Error, Result};

/// Default application namespace
pub const DEFAULT_APP_NAMESPACE: &str = "the-store";
/// Default gateway namespace
pub const DEFAULT_GATEWAY_NAMESPACE: &str = "gateway";
/// Default service roster
pub const DEFAULT_SERVICES: &[&str] = &["catalog", "carts", "orders", "checkout"];
/// Default port every roster service listens on
pub const DEFAULT_SERVICE_PORT: u16 = 80;
/// Default local port used for the port-forward access path
pub const DEFAULT_LOCAL_PORT: u16 = 8080;

/// Maximum length of a DNS-1123 label
const DNS_LABEL_MAX_LEN: usize = 63;

/// A named workload in a namespace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadRef {
    /// Deployment name
    pub name: String,
    /// Deployment namespace
    pub namespace: String,
}

impl WorkloadRef {
    /// Create a workload reference
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// Immutable, validated input for every install and rollback run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackConfig {
    app_namespace: String,
    gateway_namespace: String,
    mesh: String,
    services: Vec<String>,
    service_port: u16,
    control_plane_namespace: String,
    legacy_ingress: WorkloadRef,
    local_port: u16,
}

impl StackConfig {
    /// Start from the defaults
    pub fn builder() -> StackConfigBuilder {
        StackConfigBuilder::default()
    }

    /// Namespace the application services run in
    pub fn app_namespace(&self) -> &str {
        &self.app_namespace
    }

    /// Namespace the gateway runs in
    pub fn gateway_namespace(&self) -> &str {
        &self.gateway_namespace
    }

    /// Mesh both namespaces join
    pub fn mesh(&self) -> &str {
        &self.mesh
    }

    /// Ordered service roster
    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Port every roster service listens on
    pub fn service_port(&self) -> u16 {
        self.service_port
    }

    /// Namespace of the control-plane release
    pub fn control_plane_namespace(&self) -> &str {
        &self.control_plane_namespace
    }

    /// Competing ingress controller suspended during install
    pub fn legacy_ingress(&self) -> &WorkloadRef {
        &self.legacy_ingress
    }

    /// Local port for the port-forward access path
    pub fn local_port(&self) -> u16 {
        self.local_port
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            app_namespace: DEFAULT_APP_NAMESPACE.to_string(),
            gateway_namespace: DEFAULT_GATEWAY_NAMESPACE.to_string(),
            mesh: DEFAULT_MESH.to_string(),
            services: DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect(),
            service_port: DEFAULT_SERVICE_PORT,
            control_plane_namespace: CONTROL_PLANE_NAMESPACE.to_string(),
            legacy_ingress: WorkloadRef::new(LEGACY_INGRESS_WORKLOAD, LEGACY_INGRESS_NAMESPACE),
            local_port: DEFAULT_LOCAL_PORT,
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`StackConfig`]; unset fields keep their defaults
#[derive(Clone, Debug, Default)]
pub struct StackConfigBuilder {
    app_namespace: Option<String>,
    gateway_namespace: Option<String>,
    mesh: Option<String>,
    services: Option<Vec<String>>,
    service_port: Option<u16>,
    control_plane_namespace: Option<String>,
    legacy_ingress: Option<WorkloadRef>,
    local_port: Option<u16>,
}

impl StackConfigBuilder {
    /// Set the application namespace
    pub fn app_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.app_namespace = Some(namespace.into());
        self
    }

    /// Set the gateway namespace
    pub fn gateway_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.gateway_namespace = Some(namespace.into());
        self
    }

    /// Set the mesh identity; an empty value falls back to the default mesh
    pub fn mesh(mut self, mesh: impl Into<String>) -> Self {
        self.mesh = Some(mesh.into());
        self
    }

    /// Set the service roster
    pub fn services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = Some(services.into_iter().map(Into::into).collect());
        self
    }

    /// Set the roster from a comma-separated list (blank entries are ignored)
    pub fn services_csv(self, csv: &str) -> Self {
        self.services(parse_roster(csv))
    }

    /// Set the service port
    pub fn service_port(mut self, port: u16) -> Self {
        self.service_port = Some(port);
        self
    }

    /// Set the control-plane namespace
    pub fn control_plane_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.control_plane_namespace = Some(namespace.into());
        self
    }

    /// Set the competing ingress controller
    pub fn legacy_ingress(mut self, workload: WorkloadRef) -> Self {
        self.legacy_ingress = Some(workload);
        self
    }

    /// Set the local port-forward port
    pub fn local_port(mut self, port: u16) -> Self {
        self.local_port = Some(port);
        self
    }

    /// Validate and freeze the configuration
    pub fn build(self) -> Result<StackConfig> {
        let defaults = StackConfig::default();

        let app_namespace = self.app_namespace.unwrap_or(defaults.app_namespace);
        validate_dns_label("app_namespace", &app_namespace)?;

        let gateway_namespace = self.gateway_namespace.unwrap_or(defaults.gateway_namespace);
        validate_dns_label("gateway_namespace", &gateway_namespace)?;

        let mesh = match self.mesh {
            Some(m) if !m.trim().is_empty() => m.trim().to_string(),
            _ => defaults.mesh,
        };
        validate_dns_label("mesh", &mesh)?;

        let services = self.services.unwrap_or(defaults.services);
        validate_roster(&services)?;

        let control_plane_namespace = self
            .control_plane_namespace
            .unwrap_or(defaults.control_plane_namespace);
        validate_dns_label("control_plane_namespace", &control_plane_namespace)?;

        let legacy_ingress = self.legacy_ingress.unwrap_or(defaults.legacy_ingress);
        validate_dns_label("legacy_ingress.name", &legacy_ingress.name)?;
        validate_dns_label("legacy_ingress.namespace", &legacy_ingress.namespace)?;

        let service_port = self.service_port.unwrap_or(defaults.service_port);
        let local_port = self.local_port.unwrap_or(defaults.local_port);
        if service_port == 0 {
            return Err(Error::validation_for_field("service_port", "port must be non-zero"));
        }
        if local_port == 0 {
            return Err(Error::validation_for_field("local_port", "port must be non-zero"));
        }

        Ok(StackConfig {
            app_namespace,
            gateway_namespace,
            mesh,
            services,
            service_port,
            control_plane_namespace,
            legacy_ingress,
            local_port,
        })
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Split a comma-separated roster, trimming whitespace and dropping blanks
pub fn parse_roster(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_roster(services: &[String]) -> Result<()> {
    if services.is_empty() {
        return Err(Error::validation_for_field(
            "services",
            "service roster must not be empty",
        ));
    }
    for (i, service) in services.iter().enumerate() {
        validate_dns_label("services", service)?;
        if services[..i].contains(service) {
            return Err(Error::validation_for_field(
                "services",
                format!("duplicate service in roster: {}", service),
            ));
        }
    }
    Ok(())
}

/// Check that `value` is a DNS-1123 label: 1-63 chars of `[a-z0-9-]`,
/// starting and ending with an alphanumeric.
pub fn validate_dns_label(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation_for_field(field, format!("{} must not be empty", field)));
    }
    if value.len() > DNS_LABEL_MAX_LEN {
        return Err(Error::validation_for_field(
            field,
            format!("{} '{}' exceeds {} characters", field, value, DNS_LABEL_MAX_LEN),
        ));
    }

    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = !value.starts_with('-') && !value.ends_with('-');

    if !valid_chars || !valid_edges {
        return Err(Error::validation_for_field(
            field,
            format!("{} '{}' is not a valid DNS-1123 label", field, value),
        ));
    }
    Ok(())
}
