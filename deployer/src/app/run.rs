//! Command dispatch

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::app::options::Configuration;
use crate::deploy::orchestrator::Deployer;
use crate::errors::DeployerError;
use crate::models::deployment::{DeploymentRequest, EndpointInfo};
use crate::models::topology::ServerInstance;
use crate::utils::deployment_name_from_path;

/// What the deployer was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Deploy { artifact: PathBuf, target: String },
    Undeploy { name: String, target: String },
    Status { target: String },
}

impl Command {
    /// Pick the command from parsed `--key=value` arguments. The target
    /// defaults to the configured one.
    pub fn from_args(
        cli_args: &HashMap<String, String>,
        config: &Configuration,
    ) -> Result<Self, DeployerError> {
        let target = cli_args
            .get("target")
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .unwrap_or(config.target.as_str())
            .to_string();

        if let Some(artifact) = cli_args.get("deploy") {
            return Ok(Command::Deploy {
                artifact: PathBuf::from(artifact),
                target,
            });
        }
        if let Some(value) = cli_args.get("undeploy") {
            let name = deployment_name_from_path(Path::new(value))
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    DeployerError::ConfigError(format!("Invalid deployment name: {}", value))
                })?;
            return Ok(Command::Undeploy { name, target });
        }
        if cli_args.contains_key("status") {
            return Ok(Command::Status { target });
        }
        Err(DeployerError::ConfigError(
            "Nothing to do. Use --deploy=<artifact>, --undeploy=<name> or --status".to_string(),
        ))
    }
}

/// Result of a command
#[derive(Debug, Clone)]
pub enum Outcome {
    Deployed(EndpointInfo),
    Undeployed(String),
    Status {
        target: String,
        target_running: bool,
        servers: Vec<ServerInstance>,
    },
}

/// Run one command. The shutdown signal cancels it.
pub async fn run(
    deployer: &Deployer,
    command: Command,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<Outcome, DeployerError> {
    let cancel = deployer.cancel_token();
    let watcher = tokio::spawn(async move {
        shutdown_signal.await;
        info!("Shutdown signal received, cancelling...");
        cancel.cancel();
    });

    let result = execute(deployer, command).await;
    watcher.abort();
    result
}

async fn execute(deployer: &Deployer, command: Command) -> Result<Outcome, DeployerError> {
    match command {
        Command::Deploy { artifact, target } => {
            let request = DeploymentRequest::from_artifact(artifact, target).await?;
            let endpoint = deployer.deploy(&request).await?;
            Ok(Outcome::Deployed(endpoint))
        }
        Command::Undeploy { name, target } => {
            deployer.undeploy(&name, &target).await?;
            Ok(Outcome::Undeployed(name))
        }
        Command::Status { target } => {
            let servers = deployer.status().await?;
            let target_running = deployer.is_target_running(&target).await?;
            Ok(Outcome::Status {
                target,
                target_running,
                servers,
            })
        }
    }
}
