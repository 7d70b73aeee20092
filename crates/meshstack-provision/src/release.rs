//! Package-release management
//!
//! [`ReleaseManager`] installs, upgrades, and removes chart releases.
//! [`HelmReleases`] drives the `helm` binary; values are rendered to YAML and
//! streamed on stdin so nothing is written to disk.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use meshstack_common::{Error, Result};

/// A chart repository
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartRepository {
    /// Local alias (e.g. "kong")
    pub name: String,
    /// Repository URL
    pub url: String,
}

/// Desired state of one release
#[derive(Clone, Debug, PartialEq)]
pub struct ReleaseSpec {
    /// Release name
    pub name: String,
    /// Chart reference, `<repo alias>/<chart>`
    pub chart: String,
    /// Target namespace (created if missing)
    pub namespace: String,
    /// Repository the chart is fetched from
    pub repository: ChartRepository,
    /// Chart values
    pub values: Value,
}

/// Outcome of removing a release
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UninstallOutcome {
    /// The release existed and was removed
    Removed,
    /// There was no such release
    NotFound,
}

/// Trait abstracting the package-release manager
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReleaseManager: Send + Sync {
    /// Install the release, or upgrade it in place if it already exists
    async fn install_or_upgrade(&self, release: &ReleaseSpec) -> Result<()>;

    /// Remove a release; an absent release is reported, not an error
    async fn uninstall(&self, name: &str, namespace: &str) -> Result<UninstallOutcome>;
}

/// Upper bound on a single helm invocation
pub const DEFAULT_HELM_TIMEOUT: Duration = Duration::from_secs(600);

/// Production [`ReleaseManager`] shelling out to `helm`
pub struct HelmReleases {
    binary: PathBuf,
    kubeconfig: Option<PathBuf>,
    timeout: Duration,
}

impl HelmReleases {
    /// Use `helm` from `PATH`
    pub fn new(kubeconfig: Option<PathBuf>) -> Self {
        Self {
            binary: PathBuf::from("helm"),
            kubeconfig,
            timeout: DEFAULT_HELM_TIMEOUT,
        }
    }

    /// Use a specific helm binary
    pub fn with_binary(binary: impl Into<PathBuf>, kubeconfig: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig,
            timeout: DEFAULT_HELM_TIMEOUT,
        }
    }

    /// Kill helm if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, release: &str, args: &[String], stdin: Option<&str>) -> Result<HelmOutput> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        if let Some(path) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(path);
        }
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        debug!(release, args = ?args, "running helm");
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::release(release, format!("failed to run helm: {}", e)))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| Error::release(release, format!("failed to write values: {}", e)))?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::release(
                    release,
                    format!("helm timed out after {:?}", self.timeout),
                )
            })?
            .map_err(|e| Error::release(release, format!("helm did not complete: {}", e)))?;

        Ok(HelmOutput {
            success: output.status.success(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

struct HelmOutput {
    success: bool,
    stderr: String,
}

#[async_trait]
impl ReleaseManager for HelmReleases {
    async fn install_or_upgrade(&self, release: &ReleaseSpec) -> Result<()> {
        let repo = self.run(&release.name, &repo_add_args(&release.repository), None).await?;
        if !repo.success {
            return Err(Error::release(
                &release.name,
                format!("helm repo add {} failed: {}", release.repository.name, repo.stderr),
            ));
        }

        let values = serde_yaml::to_string(&release.values)
            .map_err(|e| Error::serialization_for("values", e.to_string()))?;

        info!(release = %release.name, chart = %release.chart, namespace = %release.namespace, "helm upgrade --install");
        let out = self
            .run(&release.name, &upgrade_args(release), Some(&values))
            .await?;
        if !out.success {
            return Err(Error::release(
                &release.name,
                format!("helm upgrade --install failed: {}", out.stderr),
            ));
        }
        Ok(())
    }

    async fn uninstall(&self, name: &str, namespace: &str) -> Result<UninstallOutcome> {
        let args: Vec<String> = ["uninstall", name, "--namespace", namespace]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let out = self.run(name, &args, None).await?;
        if out.success {
            Ok(UninstallOutcome::Removed)
        } else if is_release_not_found(&out.stderr) {
            Ok(UninstallOutcome::NotFound)
        } else {
            Err(Error::release(
                name,
                format!("helm uninstall failed: {}", out.stderr),
            ))
        }
    }
}

fn repo_add_args(repo: &ChartRepository) -> Vec<String> {
    vec![
        "repo".to_string(),
        "add".to_string(),
        repo.name.clone(),
        repo.url.clone(),
        "--force-update".to_string(),
    ]
}

fn upgrade_args(release: &ReleaseSpec) -> Vec<String> {
    vec![
        "upgrade".to_string(),
        "--install".to_string(),
        release.name.clone(),
        release.chart.clone(),
        "--namespace".to_string(),
        release.namespace.clone(),
        "--create-namespace".to_string(),
        "--values".to_string(),
        "-".to_string(),
    ]
}

/// helm reports a missing release as `Error: uninstall: Release not loaded: <name>: release: not found`
fn is_release_not_found(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("release: not found") || lower.contains("release not loaded")
}
