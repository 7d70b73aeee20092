//! Common types for meshstack: errors, Kuma policy types, and Kubernetes helpers

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod mesh;
pub mod policy;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for every server-side apply issued by meshstack
pub const FIELD_MANAGER: &str = "meshstack";

/// Label key recording which tool manages a resource
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label value for resources managed by meshstack
pub const LABEL_MANAGED_BY_MESHSTACK: &str = "meshstack";

/// Label key carrying the resource name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
