//! Install stages
//!
//! A [`Stage`] is an ordered unit of install work: readiness preconditions,
//! a body of [`Step`]s, and a [`FailurePolicy`] deciding whether a failure
//! aborts the run.

use std::fmt;

use crate::config::WorkloadRef;
use crate::readiness::ReadinessQuery;
use crate::release::ReleaseSpec;
use crate::resource::ResourceDefinition;

/// What a failed stage does to the run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the install
    Fatal,
    /// Record a warning and move on
    WarnAndContinue,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::WarnAndContinue => write!(f, "warn"),
        }
    }
}

/// One unit of work in a stage body
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Install or upgrade a chart release
    InstallRelease(ReleaseSpec),
    /// Wait for a readiness query
    Await(ReadinessQuery),
    /// Create or update a resource
    Apply(ResourceDefinition),
    /// Create a resource only if it does not exist yet
    ApplyIfAbsent(ResourceDefinition),
    /// Apply the generated traffic permissions, if the cluster supports them
    ApplyPermissions,
    /// Suspend the competing ingress controller
    SuspendLegacyIngress(WorkloadRef),
    /// Observe the gateway proxy Service and derive the access endpoint
    ComputeAccessEndpoint,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstallRelease(r) => {
                write!(f, "install {} ({}) in {}", r.name, r.chart, r.namespace)
            }
            Self::Await(q) => write!(f, "await {}", q),
            Self::Apply(d) => write!(f, "apply {}", d.id()),
            Self::ApplyIfAbsent(d) => write!(f, "create {} if absent", d.id()),
            Self::ApplyPermissions => write!(f, "apply traffic permissions"),
            Self::SuspendLegacyIngress(w) => {
                write!(f, "scale {}/{} to zero", w.namespace, w.name)
            }
            Self::ComputeAccessEndpoint => write!(f, "compute access endpoint"),
        }
    }
}

/// An install stage
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    /// Stable name used in logs and reports
    pub name: &'static str,
    /// 1-based execution order
    pub ordinal: usize,
    /// Readiness queries checked before the body runs
    pub precondition: Vec<ReadinessQuery>,
    /// Work performed by the stage
    pub body: Vec<Step>,
    /// Effect of a failure on the run
    pub failure_policy: FailurePolicy,
}

impl Stage {
    /// A stage with no precondition
    pub fn new(name: &'static str, failure_policy: FailurePolicy, body: Vec<Step>) -> Self {
        Self {
            name,
            ordinal: 0,
            precondition: Vec::new(),
            body,
            failure_policy,
        }
    }

    /// Add readiness preconditions
    pub fn with_precondition(mut self, queries: Vec<ReadinessQuery>) -> Self {
        self.precondition = queries;
        self
    }

    /// Whether a failure in this stage aborts the run
    pub fn is_fatal(&self) -> bool {
        self.failure_policy == FailurePolicy::Fatal
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {} [{}]", self.ordinal, self.name, self.failure_policy)
    }
}
