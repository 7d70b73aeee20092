//! Traffic-permission generation
//!
//! Derives one `MeshTrafficPermission` per roster service letting the
//! gateway namespace reach it. Generation is lazy and pure: iterating twice
//! yields identical definitions.

use meshstack_common::mesh::permission_name;
use meshstack_common::policy::MeshTrafficPermission;
use meshstack_common::Result;

use crate::config::StackConfig;
use crate::resource::ResourceDefinition;

/// Builds the gateway-to-service permission set from a roster
#[derive(Clone, Debug)]
pub struct PolicyGenerator<'a> {
    services: &'a [String],
    source_namespace: &'a str,
    destination_namespace: &'a str,
    mesh: &'a str,
}

impl<'a> PolicyGenerator<'a> {
    /// Permissions from `source_namespace` to each of `services` in
    /// `destination_namespace`, bound to `mesh`
    pub fn new(
        services: &'a [String],
        source_namespace: &'a str,
        destination_namespace: &'a str,
        mesh: &'a str,
    ) -> Self {
        Self {
            services,
            source_namespace,
            destination_namespace,
            mesh,
        }
    }

    /// Gateway namespace to every roster service in the app namespace
    pub fn for_stack(config: &'a StackConfig) -> Self {
        Self::new(
            config.services(),
            config.gateway_namespace(),
            config.app_namespace(),
            config.mesh(),
        )
    }

    /// Roster this generator covers
    pub fn services(&self) -> &'a [String] {
        self.services
    }

    /// One permission per roster service, in roster order.
    ///
    /// Policies live in the source (gateway) namespace.
    pub fn permissions(&self) -> impl Iterator<Item = MeshTrafficPermission> + 'a {
        let (source, destination, mesh) =
            (self.source_namespace, self.destination_namespace, self.mesh);

        self.services.iter().map(move |service| {
            MeshTrafficPermission::allow_namespace_to_service(
                permission_name(service),
                source,
                mesh,
                service.as_str(),
                destination,
                source,
            )
        })
    }

    /// [`Self::permissions`] converted to apply-ready definitions
    pub fn definitions(&self) -> impl Iterator<Item = Result<ResourceDefinition>> + 'a {
        self.permissions()
            .map(|mtp| ResourceDefinition::from_object(&mtp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshstack_common::policy::PermissionAction;

    #[test]
    fn default_roster_yields_four_named_permissions() {
        let config = StackConfig::default();
        let generator = PolicyGenerator::for_stack(&config);

        let names: Vec<String> = generator.permissions().map(|p| p.metadata.name).collect();
        assert_eq!(
            names,
            ["kong-to-catalog", "kong-to-carts", "kong-to-orders", "kong-to-checkout"]
        );
    }

    #[test]
    fn each_permission_targets_its_service_from_gateway() {
        let config = StackConfig::default();
        for (service, mtp) in config
            .services()
            .iter()
            .zip(PolicyGenerator::for_stack(&config).permissions())
        {
            assert_eq!(mtp.metadata.namespace, "gateway");
            assert_eq!(mtp.metadata.labels["kuma.io/mesh"], "default");
            assert_eq!(mtp.spec.target_ref.kind, "MeshService");
            assert_eq!(mtp.spec.target_ref.name.as_deref(), Some(service.as_str()));
            assert_eq!(mtp.spec.target_ref.namespace.as_deref(), Some("the-store"));

            let from = &mtp.spec.from[0];
            assert_eq!(from.target_ref.kind, "MeshSubset");
            assert_eq!(from.target_ref.tags["k8s.kuma.io/namespace"], "gateway");
            assert_eq!(from.default.action, PermissionAction::Allow);
        }
    }

    #[test]
    fn generation_is_restartable() {
        let config = StackConfig::builder()
            .services(["orders", "carts"])
            .mesh("shop")
            .build()
            .unwrap();
        let generator = PolicyGenerator::for_stack(&config);

        let first: Vec<_> = generator.definitions().map(Result::unwrap).collect();
        let second: Vec<_> = generator.definitions().map(Result::unwrap).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].document()["metadata"]["labels"]["kuma.io/mesh"], "shop");
    }
}
