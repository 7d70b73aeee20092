//! Policy type definitions for Kong Mesh (Kuma)
//!
//! Types for generating:
//! - Mesh (the security/routing domain, with builtin-CA mTLS)
//! - MeshTrafficPermission (targetRef-based allow rules between workloads)
//!
//! All policy types implement the `HasApiResource` trait for consistent
//! API version and kind handling.

mod kuma;

pub use kuma::{
    Mesh, MeshSpec, MeshTrafficPermission, MeshTrafficPermissionSpec, MtlsBackend, MtlsSpec,
    PermissionAction, PermissionConf, PermissionFrom, PolicyTargetRef, BUILTIN_CA_BACKEND,
};
