//! Readiness probing
//!
//! [`poll_until`] is the transport-independent polling loop: it knows nothing
//! about the cluster and is driven entirely by tokio time, so tests can run it
//! on a paused clock. [`ReadinessProber`] maps a [`ReadinessQuery`] onto a
//! [`ClusterApi`] check and feeds it to the loop.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use meshstack_common::Error;

use crate::cluster::ClusterApi;
use crate::resource::{ResourceDefinition, ResourceId};

/// Default time between checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default maximum number of checks
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;
/// Default deadline for a schema (CRD) to appear
pub const SCHEMA_DEADLINE: Duration = Duration::from_secs(120);
/// Default deadline for a workload to become available
pub const WORKLOAD_DEADLINE: Duration = Duration::from_secs(300);
/// Default deadline for a service to gain endpoints
pub const ENDPOINTS_DEADLINE: Duration = Duration::from_secs(120);
/// Default deadline for the admission webhook to accept writes
pub const ADMISSION_DEADLINE: Duration = Duration::from_secs(120);

/// Result of a bounded poll
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held
    Ready {
        /// Checks performed, including the successful one
        attempts: u32,
    },
    /// Attempts or deadline exhausted first
    TimedOut {
        /// Checks performed
        attempts: u32,
        /// Time spent polling
        elapsed: Duration,
        /// Error from the most recent failed check, if any
        last_error: Option<String>,
    },
}

impl PollOutcome {
    /// Whether the condition held
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Poll `check` every `interval` until it returns `Ok(true)`, `max_attempts`
/// checks have been made, or `deadline` has elapsed.
///
/// At least one check is always made. Check errors count as "not ready yet";
/// the most recent one is carried in the timeout.
pub async fn poll_until<F, Fut>(
    interval: Duration,
    max_attempts: u32,
    deadline: Duration,
    mut check: F,
) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    let mut last_error = None;

    loop {
        attempts += 1;
        match check().await {
            Ok(true) => return PollOutcome::Ready { attempts },
            Ok(false) => trace!(attempts, "condition not yet met"),
            Err(e) => {
                trace!(attempts, error = %e, "check failed, retrying");
                last_error = Some(e.to_string());
            }
        }

        let elapsed = start.elapsed();
        if attempts >= max_attempts || elapsed + interval > deadline {
            return PollOutcome::TimedOut {
                attempts,
                elapsed,
                last_error,
            };
        }

        tokio::time::sleep(interval).await;
    }
}

// =============================================================================
// Queries
// =============================================================================

/// What a readiness query waits for
#[derive(Clone, Debug, PartialEq)]
pub enum ReadinessTarget {
    /// A CustomResourceDefinition is registered
    Schema {
        /// CRD name, e.g. "meshes.kuma.io"
        crd: String,
    },
    /// A Deployment reports `Available`
    Workload {
        /// Deployment name
        name: String,
        /// Deployment namespace
        namespace: String,
    },
    /// A Service has at least one ready endpoint
    Endpoints {
        /// Service name
        service: String,
        /// Service namespace
        namespace: String,
    },
    /// The admission webhook accepts a dry-run write of `probe`
    Admission {
        /// Synthetic object submitted as a dry run
        probe: ResourceDefinition,
    },
}

impl fmt::Display for ReadinessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema { crd } => write!(f, "schema {}", crd),
            Self::Workload { name, namespace } => write!(f, "workload {}/{}", namespace, name),
            Self::Endpoints { service, namespace } => {
                write!(f, "endpoints {}/{}", namespace, service)
            }
            Self::Admission { probe } => write!(f, "admission of {}", probe.id()),
        }
    }
}

/// A bounded wait for one target
#[derive(Clone, Debug, PartialEq)]
pub struct ReadinessQuery {
    /// What to wait for
    pub target: ReadinessTarget,
    /// Time between checks
    pub interval: Duration,
    /// Maximum number of checks
    pub max_attempts: u32,
    /// Wall-clock bound
    pub deadline: Duration,
}

impl ReadinessQuery {
    fn with_deadline(target: ReadinessTarget, deadline: Duration) -> Self {
        Self {
            target,
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            deadline,
        }
    }

    /// Wait for a CRD
    pub fn schema(crd: impl Into<String>) -> Self {
        Self::with_deadline(ReadinessTarget::Schema { crd: crd.into() }, SCHEMA_DEADLINE)
    }

    /// Wait for a Deployment to become available
    pub fn workload(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::with_deadline(
            ReadinessTarget::Workload {
                name: name.into(),
                namespace: namespace.into(),
            },
            WORKLOAD_DEADLINE,
        )
    }

    /// Wait for a Service to gain endpoints
    pub fn endpoints(service: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::with_deadline(
            ReadinessTarget::Endpoints {
                service: service.into(),
                namespace: namespace.into(),
            },
            ENDPOINTS_DEADLINE,
        )
    }

    /// Wait for admission to accept a dry-run write of `probe`
    pub fn admission(probe: ResourceDefinition) -> Self {
        Self::with_deadline(ReadinessTarget::Admission { probe }, ADMISSION_DEADLINE)
    }

    /// Override interval and attempt budget
    pub fn with_timing(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.interval = interval;
        self.max_attempts = max_attempts;
        self
    }
}

impl fmt::Display for ReadinessQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.target.fmt(f)
    }
}

// =============================================================================
// Prober
// =============================================================================

/// Resolves readiness queries against the cluster
#[derive(Clone)]
pub struct ReadinessProber {
    cluster: Arc<dyn ClusterApi>,
}

impl ReadinessProber {
    /// Create a prober over the given cluster
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// Poll until the query's target is ready or its budget runs out
    pub async fn wait_for(&self, query: &ReadinessQuery) -> PollOutcome {
        debug!(query = %query, deadline = ?query.deadline, "waiting for readiness");
        let target = &query.target;
        poll_until(query.interval, query.max_attempts, query.deadline, move || {
            self.check(target)
        })
        .await
    }

    /// A single check of `target`
    pub async fn check(&self, target: &ReadinessTarget) -> Result<bool, Error> {
        match target {
            ReadinessTarget::Schema { crd } => self.cluster.exists(&ResourceId::crd(crd)).await,
            ReadinessTarget::Workload { name, namespace } => {
                self.cluster.workload_available(name, namespace).await
            }
            ReadinessTarget::Endpoints { service, namespace } => {
                Ok(self.cluster.endpoint_count(service, namespace).await? > 0)
            }
            ReadinessTarget::Admission { probe } => {
                self.cluster.dry_run_apply(probe).await.map(|()| true)
            }
        }
    }
}
