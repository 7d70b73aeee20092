//! CLI commands

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use meshstack_common::kube_utils::create_client;
use meshstack_provision::{HelmReleases, KubeCluster};

use crate::{Error, Result};

pub mod install;
pub mod rollback;

/// Extension trait to convert errors with Display to CLI Error::CommandFailed.
pub trait CommandErrorExt<T> {
    /// Convert an error to `Error::CommandFailed` using its Display implementation.
    fn cmd_err(self) -> Result<T>;
}

impl<T, E: Display> CommandErrorExt<T> for std::result::Result<T, E> {
    fn cmd_err(self) -> Result<T> {
        self.map_err(|e| Error::command_failed(e.to_string()))
    }
}

/// Production cluster and release adapters for a kubeconfig
pub(crate) async fn connect(
    kubeconfig: Option<&Path>,
) -> Result<(Arc<KubeCluster>, Arc<HelmReleases>)> {
    let client = create_client(kubeconfig)
        .await
        .cmd_err()?;
    let releases = HelmReleases::new(kubeconfig.map(Path::to_path_buf));
    Ok((Arc::new(KubeCluster::new(client)), Arc::new(releases)))
}
