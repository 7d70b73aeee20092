//! meshstack CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use meshstack_common::mesh::{
    CONTROL_PLANE_NAMESPACE, DEFAULT_MESH, LEGACY_INGRESS_NAMESPACE, LEGACY_INGRESS_WORKLOAD,
};
use meshstack_provision::config::{
    DEFAULT_APP_NAMESPACE, DEFAULT_GATEWAY_NAMESPACE, DEFAULT_LOCAL_PORT, DEFAULT_SERVICE_PORT,
};
use meshstack_provision::{StackConfig, WorkloadRef};

/// meshstack - provision Kong Mesh, Kong Gateway, and mesh policies
#[derive(Parser, Debug)]
#[command(name = "meshstack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to kubeconfig (defaults to the usual inference chain)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<PathBuf>,

    #[command(flatten)]
    pub stack: StackArgs,

    /// Defaults to `install`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install or converge the control plane, gateway, and policies
    Install(commands::install::InstallArgs),
    /// Remove the gateway and restore the previous ingress controller
    Rollback,
}

/// Stack configuration flags, each overridable from the environment
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Namespace the application services run in
    #[arg(long = "namespace", env = "APP_NAMESPACE", default_value = DEFAULT_APP_NAMESPACE, global = true)]
    pub app_namespace: String,

    /// Namespace the gateway is installed into
    #[arg(long, env = "GATEWAY_NAMESPACE", default_value = DEFAULT_GATEWAY_NAMESPACE, global = true)]
    pub gateway_namespace: String,

    /// Mesh both namespaces join (empty means the default mesh)
    #[arg(long, env = "MESH_NAME", default_value = DEFAULT_MESH, global = true)]
    pub mesh: String,

    /// Comma-separated service roster
    #[arg(long, env = "MESHSTACK_SERVICES", default_value = "catalog,carts,orders,checkout", global = true)]
    pub services: String,

    /// Port every roster service listens on
    #[arg(long, env = "MESHSTACK_SERVICE_PORT", default_value_t = DEFAULT_SERVICE_PORT, global = true)]
    pub service_port: u16,

    /// Namespace of the control plane
    #[arg(long, env = "CONTROL_PLANE_NAMESPACE", default_value = CONTROL_PLANE_NAMESPACE, global = true)]
    pub control_plane_namespace: String,

    /// Deployment of the ingress controller the gateway replaces
    #[arg(long, env = "LEGACY_INGRESS", default_value = LEGACY_INGRESS_WORKLOAD, global = true)]
    pub legacy_ingress: String,

    /// Namespace of the ingress controller the gateway replaces
    #[arg(long, env = "LEGACY_INGRESS_NAMESPACE", default_value = LEGACY_INGRESS_NAMESPACE, global = true)]
    pub legacy_ingress_namespace: String,

    /// Local port suggested for port-forwarding to the gateway
    #[arg(long, env = "MESHSTACK_LOCAL_PORT", default_value_t = DEFAULT_LOCAL_PORT, global = true)]
    pub local_port: u16,
}

impl StackArgs {
    /// Validate the flags into an immutable stack configuration
    pub fn to_config(&self) -> Result<StackConfig> {
        let config = StackConfig::builder()
            .app_namespace(&self.app_namespace)
            .gateway_namespace(&self.gateway_namespace)
            .mesh(&self.mesh)
            .services_csv(&self.services)
            .service_port(self.service_port)
            .control_plane_namespace(&self.control_plane_namespace)
            .legacy_ingress(WorkloadRef::new(
                &self.legacy_ingress,
                &self.legacy_ingress_namespace,
            ))
            .local_port(self.local_port)
            .build()?;
        Ok(config)
    }
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let config = self.stack.to_config()?;
        let kubeconfig = self.kubeconfig.as_deref();

        match self.command {
            Some(Commands::Install(args)) => commands::install::run(args, &config, kubeconfig).await,
            None => {
                commands::install::run(Default::default(), &config, kubeconfig).await
            }
            Some(Commands::Rollback) => commands::rollback::run(&config, kubeconfig).await,
        }
    }
}
