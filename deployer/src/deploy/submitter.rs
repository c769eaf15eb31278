//! Deployment submission strategies
//!
//! The process strategy forks weblogic.Deployer and treats its exit code as
//! advisory. The RPC strategy calls the deployment manager over the
//! management channel and hands back a progress handle.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::options::Configuration;
use crate::deploy::command::{ToolAction, ToolCommand};
use crate::errors::DeployerError;
use crate::mgmt::channel::{get_ref, get_refs, get_text, ManagementChannel, ObjectName};
use crate::models::deployment::{DeploymentRequest, ProgressHandle};
use crate::security::guard::TrustStoreState;
use crate::storage::settings::SubmissionStrategy;

/// What the tool printed and how it exited
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,

    /// stdout and stderr lines in arrival order
    pub lines: Vec<String>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Run a tool command, draining its output while waiting for it to exit
pub async fn run_tool(
    command: &ToolCommand,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ToolOutput, DeployerError> {
    debug!("Executing {}", command.masked());

    let mut child = Command::new(command.program())
        .args(command.args())
        .envs(command.env().iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            DeployerError::SubmissionError(format!(
                "Failed to start {}: {}",
                command.program().display(),
                e
            ))
        })?;

    // Readers start before the wait so a full pipe never blocks the child.
    let sink = Arc::new(Mutex::new(Vec::new()));
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, "stdout", Arc::clone(&sink)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, "stderr", Arc::clone(&sink)));
    }

    let waited = tokio::select! {
        result = tokio::time::timeout(timeout, child.wait()) => Some(result),
        _ = cancel.cancelled() => None,
    };

    let status = match waited {
        Some(Ok(Ok(status))) => status,
        Some(Ok(Err(e))) => {
            return Err(DeployerError::SubmissionError(format!(
                "Interrupted while waiting for the deployment tool: {}",
                e
            )));
        }
        Some(Err(_)) => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill the deployment tool: {}", e);
            }
            return Err(DeployerError::SubmissionError(format!(
                "The deployment tool did not exit within {}s",
                timeout.as_secs()
            )));
        }
        None => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill the deployment tool: {}", e);
            }
            return Err(DeployerError::Cancelled);
        }
    };

    for reader in readers {
        if let Err(e) = reader.await {
            warn!("Output reader failed: {}", e);
        }
    }
    let lines = std::mem::take(&mut *sink.lock().await);

    Ok(ToolOutput {
        exit_code: status.code(),
        lines,
    })
}

fn spawn_reader<R>(stream: R, name: &'static str, sink: Arc<Mutex<Vec<String>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!("[{}] {}", name, line);
                    sink.lock().await.push(line);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading {}: {}", name, e);
                    break;
                }
            }
        }
    })
}

/// Submits through the weblogic.Deployer tool
#[derive(Debug, Default, Clone)]
pub struct ProcessSubmitter;

impl ProcessSubmitter {
    async fn submit(
        &self,
        config: &Configuration,
        command: ToolCommand,
        cancel: &CancellationToken,
    ) -> Result<Option<ProgressHandle>, DeployerError> {
        let output = run_tool(&command, config.timeouts.tool, cancel).await?;
        if output.success() {
            debug!("weblogic.Deployer finished");
        } else {
            warn!(
                "weblogic.Deployer exited with {:?}, the runtime state decides the outcome. Output:\n{}",
                output.exit_code,
                output.text()
            );
        }
        Ok(None)
    }

    pub async fn deploy(
        &self,
        config: &Configuration,
        request: &DeploymentRequest,
        trust: &TrustStoreState,
        cancel: &CancellationToken,
    ) -> Result<Option<ProgressHandle>, DeployerError> {
        let command = ToolCommand::build(
            config,
            ToolAction::Deploy,
            &request.name,
            Some(request.artifact_path.as_path()),
            &request.target,
        )
        .with_trust_store(trust);
        self.submit(config, command, cancel).await
    }

    pub async fn undeploy(
        &self,
        config: &Configuration,
        name: &str,
        target: &str,
        trust: &TrustStoreState,
        cancel: &CancellationToken,
    ) -> Result<Option<ProgressHandle>, DeployerError> {
        let command = ToolCommand::build(config, ToolAction::Undeploy, name, None, target)
            .with_trust_store(trust);
        self.submit(config, command, cancel).await
    }
}

/// Submits through the deployment manager over the management channel
#[derive(Debug, Default, Clone)]
pub struct RpcSubmitter;

fn submission_error(e: DeployerError) -> DeployerError {
    match e {
        DeployerError::Cancelled | DeployerError::SubmissionError(_) => e,
        other => DeployerError::SubmissionError(other.to_string()),
    }
}

impl RpcSubmitter {
    async fn deployment_manager(
        &self,
        channel: &dyn ManagementChannel,
    ) -> Result<ObjectName, DeployerError> {
        let runtime = get_ref(channel, &ObjectName::domain_runtime_service(), "DomainRuntime").await?;
        get_ref(channel, &runtime, "DeploymentManager").await
    }

    pub async fn deploy(
        &self,
        config: &Configuration,
        channel: &dyn ManagementChannel,
        request: &DeploymentRequest,
    ) -> Result<Option<ProgressHandle>, DeployerError> {
        let manager = self.deployment_manager(channel).await.map_err(submission_error)?;
        let args = json!({
            "applicationName": request.name,
            "applicationPath": request.artifact_path.display().to_string(),
            "targets": [request.target],
        });

        let result = if config.remote_machine {
            info!("Uploading {} to the admin server", request.artifact_path.display());
            channel
                .invoke_with_upload(&manager, "deploy", args, &request.artifact_path)
                .await
        } else {
            channel.invoke(&manager, "deploy", args).await
        }
        .map_err(submission_error)?;

        let progress = result.into_ref().map_err(submission_error)?.ok_or_else(|| {
            DeployerError::SubmissionError(format!(
                "The deploy of {} returned no progress object",
                request.name
            ))
        })?;

        Ok(Some(ProgressHandle {
            object: progress,
            deployment_manager: manager,
            application: request.name.clone(),
            submitted_at: Utc::now(),
        }))
    }

    pub async fn undeploy(
        &self,
        channel: &dyn ManagementChannel,
        name: &str,
        target: &str,
    ) -> Result<Option<ProgressHandle>, DeployerError> {
        let manager = self.deployment_manager(channel).await.map_err(submission_error)?;
        let runtimes = get_refs(channel, &manager, "AppDeploymentRuntimes")
            .await
            .map_err(submission_error)?;

        let mut found = None;
        for runtime in runtimes {
            if get_text(channel, &runtime, "Name").await.map_err(submission_error)? == name {
                found = Some(runtime);
                break;
            }
        }
        let Some(runtime) = found else {
            info!("No application runtime named {}, nothing to undeploy", name);
            return Ok(None);
        };

        let progress = channel
            .invoke(&runtime, "undeploy", json!({ "targets": [target] }))
            .await
            .and_then(|value| value.into_ref())
            .map_err(submission_error)?;

        Ok(progress.map(|object| ProgressHandle {
            object,
            deployment_manager: manager,
            application: name.to_string(),
            submitted_at: Utc::now(),
        }))
    }
}

/// The submission strategy, chosen once from configuration
#[derive(Debug, Clone)]
pub enum Submitter {
    Process(ProcessSubmitter),
    Rpc(RpcSubmitter),
}

impl Submitter {
    pub fn from_config(config: &Configuration) -> Self {
        match config.submission_strategy {
            SubmissionStrategy::Process => Submitter::Process(ProcessSubmitter),
            SubmissionStrategy::Rest => Submitter::Rpc(RpcSubmitter),
        }
    }

    /// Submit a deploy. Only the RPC strategy yields a progress handle.
    pub async fn deploy(
        &self,
        config: &Configuration,
        channel: &dyn ManagementChannel,
        request: &DeploymentRequest,
        trust: &TrustStoreState,
        cancel: &CancellationToken,
    ) -> Result<Option<ProgressHandle>, DeployerError> {
        info!("Submitting deploy of {} to {}", request.name, request.target);
        match self {
            Submitter::Process(process) => process.deploy(config, request, trust, cancel).await,
            Submitter::Rpc(rpc) => rpc.deploy(config, channel, request).await,
        }
    }

    /// Submit an undeploy
    pub async fn undeploy(
        &self,
        config: &Configuration,
        channel: &dyn ManagementChannel,
        name: &str,
        target: &str,
        trust: &TrustStoreState,
        cancel: &CancellationToken,
    ) -> Result<Option<ProgressHandle>, DeployerError> {
        info!("Submitting undeploy of {} from {}", name, target);
        match self {
            Submitter::Process(process) => {
                process.undeploy(config, name, target, trust, cancel).await
            }
            Submitter::Rpc(rpc) => rpc.undeploy(channel, name, target).await,
        }
    }
}
