//! Deployment orchestrator
//!
//! One call runs strictly in sequence: enter the trust scope, open the
//! channel, submit, poll, resolve. The channel is closed and the trust scope
//! reverted on every exit path; cleanup errors never replace the error that
//! ended the call.
//!
//! Cancellation is observed where the call waits (the tool process and the
//! progress poll), so a cancelled poll still releases its progress object.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::options::Configuration;
use crate::deploy::progress::{self, PollOptions, TerminalState};
use crate::deploy::resolver::Resolver;
use crate::deploy::submitter::Submitter;
use crate::errors::DeployerError;
use crate::mgmt::channel::{ChannelConnector, ManagementChannel};
use crate::models::deployment::{DeploymentRequest, EndpointInfo, ProgressHandle};
use crate::models::topology::ServerInstance;
use crate::security::guard::{TrustGuard, TrustScope};

/// Sleep function used between progress samples
pub type SleepFn = Arc<dyn Fn(Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Sleep on the tokio timer
pub fn tokio_sleep() -> SleepFn {
    Arc::new(|duration| Box::pin(tokio::time::sleep(duration)))
}

/// Deploys and undeploys applications and resolves where they are served
pub struct Deployer {
    config: Arc<Configuration>,
    connector: Arc<dyn ChannelConnector>,
    submitter: Submitter,
    guard: Arc<TrustGuard>,
    poll_options: PollOptions,
    sleep_fn: SleepFn,
    cancel: CancellationToken,
    serial: Mutex<()>,
}

impl Deployer {
    /// Create a deployer with the configured submission strategy, the process
    /// trust guard and the tokio timer
    pub fn new(config: Arc<Configuration>, connector: Arc<dyn ChannelConnector>) -> Self {
        let submitter = Submitter::from_config(&config);
        let poll_options = PollOptions::with_max_wait(config.timeouts.deploy);
        Self {
            config,
            connector,
            submitter,
            guard: Arc::new(TrustGuard::process()),
            poll_options,
            sleep_fn: tokio_sleep(),
            cancel: CancellationToken::new(),
            serial: Mutex::new(()),
        }
    }

    pub fn with_guard(mut self, guard: Arc<TrustGuard>) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_poll_options(mut self, options: PollOptions) -> Self {
        self.poll_options = options;
        self
    }

    pub fn with_sleep_fn(mut self, sleep_fn: SleepFn) -> Self {
        self.sleep_fn = sleep_fn;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Token that cancels the call in flight
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Deploy an artifact and return where it is served
    pub async fn deploy(&self, request: &DeploymentRequest) -> Result<EndpointInfo, DeployerError> {
        let _serial = self.serial.lock().await;
        info!(
            "Deploying {} ({}) to {}",
            request.name,
            request.artifact_path.display(),
            request.target
        );

        let (scope, channel) = self.open_session().await?;
        let result = self.run_deploy(channel.as_ref(), request).await;
        self.finish(result, scope, channel).await
    }

    /// Undeploy by name. Undeploying an absent deployment succeeds.
    pub async fn undeploy(&self, name: &str, target: &str) -> Result<(), DeployerError> {
        let _serial = self.serial.lock().await;
        info!("Undeploying {} from {}", name, target);

        let (scope, channel) = self.open_session().await?;
        let result = self.run_undeploy(channel.as_ref(), name, target).await;
        self.finish(result, scope, channel).await
    }

    /// Server instances of the domain with their states
    pub async fn status(&self) -> Result<Vec<ServerInstance>, DeployerError> {
        let _serial = self.serial.lock().await;
        let (scope, channel) = self.open_session().await?;
        let result = Resolver::new(channel.as_ref()).list_servers().await;
        self.finish(result, scope, channel).await
    }

    /// Whether a server or cluster target has a running instance
    pub async fn is_target_running(&self, target: &str) -> Result<bool, DeployerError> {
        let _serial = self.serial.lock().await;
        let (scope, channel) = self.open_session().await?;
        let result = Resolver::new(channel.as_ref()).is_target_running(target).await;
        self.finish(result, scope, channel).await
    }

    async fn open_session(&self) -> Result<(TrustScope, Box<dyn ManagementChannel>), DeployerError> {
        let scope = self.guard.enter(&self.config.security)?;
        match self.connector.open(&self.config, &self.config.security).await {
            Ok(channel) => Ok((scope, channel)),
            Err(e) => Err(match scope.revert() {
                Ok(()) => e,
                Err(cleanup) => {
                    warn!("{}", cleanup);
                    e.with_suppressed(vec![cleanup])
                }
            }),
        }
    }

    async fn finish<T>(
        &self,
        result: Result<T, DeployerError>,
        scope: TrustScope,
        channel: Box<dyn ManagementChannel>,
    ) -> Result<T, DeployerError> {
        let mut cleanup = Vec::new();
        if let Err(e) = channel.close().await {
            cleanup.push(e);
        }
        if let Err(e) = scope.revert() {
            cleanup.push(e);
        }
        for e in &cleanup {
            warn!("Cleanup failed: {}", e);
        }

        match result {
            Ok(value) => Ok(value),
            Err(e) => Err(e.with_suppressed(cleanup)),
        }
    }

    async fn drive(
        &self,
        channel: &dyn ManagementChannel,
        handle: &ProgressHandle,
    ) -> Result<TerminalState, DeployerError> {
        let sleep_fn = Arc::clone(&self.sleep_fn);
        let state = progress::poll(
            channel,
            handle,
            &self.poll_options,
            move |duration| sleep_fn(duration),
            &self.cancel,
        )
        .await?;
        if state == TerminalState::Unknown {
            warn!(
                "{} did not report a terminal state within {:?}, checking the runtime",
                handle.application, self.poll_options.max_wait
            );
        }
        Ok(state)
    }

    async fn run_deploy(
        &self,
        channel: &dyn ManagementChannel,
        request: &DeploymentRequest,
    ) -> Result<EndpointInfo, DeployerError> {
        let trust = self.guard.current();
        let handle = self
            .submitter
            .deploy(&self.config, channel, request, &trust, &self.cancel)
            .await?;
        if let Some(handle) = handle {
            self.drive(channel, &handle).await?;
        }
        Resolver::new(channel)
            .build_endpoint(&request.name, &request.target)
            .await
    }

    async fn run_undeploy(
        &self,
        channel: &dyn ManagementChannel,
        name: &str,
        target: &str,
    ) -> Result<(), DeployerError> {
        let trust = self.guard.current();
        let handle = self
            .submitter
            .undeploy(&self.config, channel, name, target, &trust, &self.cancel)
            .await?;
        if let Some(handle) = handle {
            self.drive(channel, &handle).await?;
        }
        if !Resolver::new(channel).confirm_absent(name).await? {
            return Err(DeployerError::UndeployVerification(name.to_string()));
        }
        info!("{} is no longer deployed", name);
        Ok(())
    }
}
