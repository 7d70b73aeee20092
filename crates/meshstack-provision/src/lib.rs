//! Staged, idempotent provisioning of Kong Mesh, Kong Gateway, and mesh policies
//!
//! The [`Installer`] walks a ten-stage [`StageGraph`] against a cluster,
//! gating each stage on readiness of the components it depends on. The
//! [`Rollback`] path removes the gateway and restores the previous ingress.
//! Both talk to the outside world only through the [`ClusterApi`] and
//! [`ReleaseManager`] traits.

#![deny(missing_docs)]

pub mod applier;
pub mod charts;
pub mod cluster;
pub mod config;
pub mod endpoint;
pub mod gateway;
pub mod graph;
pub mod install;
pub mod migration;
pub mod policy;
pub mod readiness;
pub mod release;
pub mod resource;
pub mod rollback;
pub mod stage;

pub use applier::{ApplyOutcome, ApplyResult, ResourceApplier};
pub use cluster::{ClusterApi, KubeCluster, ScaleOutcome, ServiceAddress};
pub use config::{StackConfig, StackConfigBuilder, WorkloadRef};
pub use endpoint::{AccessEndpoint, AccessMethod};
pub use graph::StageGraph;
pub use install::{InstallReport, InstallState, Installer, StageOutcome, StageReport};
pub use migration::{MigrationAssist, MigrationOutcome};
pub use policy::PolicyGenerator;
pub use readiness::{poll_until, PollOutcome, ReadinessProber, ReadinessQuery, ReadinessTarget};
pub use release::{HelmReleases, ReleaseManager, ReleaseSpec, UninstallOutcome};
pub use resource::{ResourceDefinition, ResourceId};
pub use rollback::{ReleaseRemoval, Rollback, RollbackReport};
pub use stage::{FailurePolicy, Stage, Step};

pub use meshstack_common::{Error, Result};
