//! Resource applier
//!
//! Submits definitions to the cluster and turns every result into an
//! [`ApplyResult`]. "Already exists" is never an error: `apply` updates in
//! place, `apply_if_absent` reports [`ApplyOutcome::AlreadyPresent`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cluster::ClusterApi;
use crate::resource::{ResourceDefinition, ResourceId};

/// What happened to one definition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Created or updated
    Applied,
    /// Left untouched because it already existed
    AlreadyPresent,
    /// The store rejected it
    Failed(String),
}

/// Per-resource result of an apply
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyResult {
    /// Resource the result is for
    pub id: ResourceId,
    /// Outcome
    pub outcome: ApplyOutcome,
}

impl ApplyResult {
    fn new(id: ResourceId, outcome: ApplyOutcome) -> Self {
        Self { id, outcome }
    }

    /// Whether the resource is in its desired state
    pub fn succeeded(&self) -> bool {
        !matches!(self.outcome, ApplyOutcome::Failed(_))
    }
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ApplyOutcome::Applied => write!(f, "{} applied", self.id),
            ApplyOutcome::AlreadyPresent => write!(f, "{} already present", self.id),
            ApplyOutcome::Failed(msg) => write!(f, "{} failed: {}", self.id, msg),
        }
    }
}

/// Idempotent resource submission
#[derive(Clone)]
pub struct ResourceApplier {
    cluster: Arc<dyn ClusterApi>,
}

impl ResourceApplier {
    /// Create an applier over the given cluster
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// Create or update `definition`
    pub async fn apply(&self, definition: &ResourceDefinition) -> ApplyResult {
        let id = definition.id().clone();
        match self.cluster.apply(definition).await {
            Ok(()) => {
                debug!(resource = %id, "applied");
                ApplyResult::new(id, ApplyOutcome::Applied)
            }
            Err(e) => {
                warn!(resource = %id, error = %e, "apply failed");
                ApplyResult::new(id, ApplyOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Create `definition` only if nothing with its id exists yet
    pub async fn apply_if_absent(&self, definition: &ResourceDefinition) -> ApplyResult {
        let id = definition.id();
        match self.cluster.exists(id).await {
            Ok(true) => {
                debug!(resource = %id, "already present");
                ApplyResult::new(id.clone(), ApplyOutcome::AlreadyPresent)
            }
            Ok(false) => self.apply(definition).await,
            Err(e) => {
                warn!(resource = %id, error = %e, "existence check failed");
                ApplyResult::new(id.clone(), ApplyOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Apply each definition in order; one failure never stops the rest
    pub async fn apply_all<I>(&self, definitions: I) -> Vec<ApplyResult>
    where
        I: IntoIterator<Item = ResourceDefinition>,
    {
        let mut results = Vec::new();
        for definition in definitions {
            results.push(self.apply(&definition).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterApi;
    use meshstack_common::Error;
    use mockall::predicate::always;
    use std::collections::BTreeMap;

    fn namespace(name: &str) -> ResourceDefinition {
        ResourceDefinition::namespace(name, BTreeMap::new()).unwrap()
    }

    #[tokio::test]
    async fn apply_if_absent_skips_existing() {
        let mut cluster = MockClusterApi::new();
        cluster.expect_exists().returning(|_| Ok(true));
        cluster.expect_apply().never();

        let applier = ResourceApplier::new(Arc::new(cluster));
        let result = applier.apply_if_absent(&namespace("the-store")).await;
        assert_eq!(result.outcome, ApplyOutcome::AlreadyPresent);
        assert!(result.succeeded());
    }

    #[tokio::test]
    async fn apply_if_absent_creates_missing() {
        let mut cluster = MockClusterApi::new();
        cluster.expect_exists().returning(|_| Ok(false));
        cluster.expect_apply().times(1).returning(|_| Ok(()));

        let applier = ResourceApplier::new(Arc::new(cluster));
        let result = applier.apply_if_absent(&namespace("gateway")).await;
        assert_eq!(result.outcome, ApplyOutcome::Applied);
    }

    /// Story: a rejected resource in the middle of a batch does not stop
    /// the resources after it from being submitted.
    #[tokio::test]
    async fn apply_all_isolates_failures() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_apply()
            .with(always())
            .times(3)
            .returning(|def| {
                if def.id().name == "b" {
                    Err(Error::internal("admission denied"))
                } else {
                    Ok(())
                }
            });

        let applier = ResourceApplier::new(Arc::new(cluster));
        let results = applier
            .apply_all(vec![namespace("a"), namespace("b"), namespace("c")])
            .await;

        let outcomes: Vec<bool> = results.iter().map(ApplyResult::succeeded).collect();
        assert_eq!(outcomes, [true, false, true]);
        assert_eq!(
            results[1].to_string(),
            "Namespace/b failed: internal error [unknown]: admission denied"
        );
    }

    #[tokio::test]
    async fn existence_check_error_is_reported_not_raised() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_exists()
            .returning(|_| Err(Error::internal("timeout")));

        let applier = ResourceApplier::new(Arc::new(cluster));
        let result = applier.apply_if_absent(&namespace("x")).await;
        assert!(!result.succeeded());
    }
}
