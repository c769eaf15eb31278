//! Progress polling for submitted deployment operations

use std::future::Future;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::DeployerError;
use crate::mgmt::channel::{MBeanValue, ManagementChannel};
use crate::models::deployment::ProgressHandle;

pub const STATE_COMPLETED: &str = "STATE_COMPLETED";
pub const STATE_FAILED: &str = "STATE_FAILED";

/// Poller options
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Time between samples
    pub interval: Duration,

    /// Give up sampling after this long
    pub max_wait: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(200),
        }
    }
}

impl PollOptions {
    pub fn with_max_wait(max_wait: Duration) -> Self {
        Self {
            max_wait,
            ..Default::default()
        }
    }
}

/// Where sampling stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Completed,
    Failed,

    /// The wait ran out first. Often the server does not report the state at
    /// all, so this is not a failure.
    Unknown,
}

/// Sample the handle's state until it is terminal or the wait runs out
pub async fn sample<S, F>(
    channel: &dyn ManagementChannel,
    handle: &ProgressHandle,
    options: &PollOptions,
    sleep_fn: S,
    cancel: &CancellationToken,
) -> Result<TerminalState, DeployerError>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let mut waited = Duration::ZERO;
    loop {
        match channel.get_attribute(&handle.object, "State").await? {
            MBeanValue::Text(state) if state == STATE_COMPLETED => {
                return Ok(TerminalState::Completed)
            }
            MBeanValue::Text(state) if state == STATE_FAILED => return Ok(TerminalState::Failed),
            state => debug!("{} is {:?} after {:?}", handle.application, state, waited),
        }

        if waited >= options.max_wait {
            return Ok(TerminalState::Unknown);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(DeployerError::Cancelled),
            _ = sleep_fn(options.interval) => {}
        }
        waited += options.interval;
    }
}

/// Drive a handle to a terminal state and release it on the server.
///
/// A failed operation is returned as [`DeployerError::DeploymentFailed`]
/// carrying the first failed target and its error text.
pub async fn poll<S, F>(
    channel: &dyn ManagementChannel,
    handle: &ProgressHandle,
    options: &PollOptions,
    sleep_fn: S,
    cancel: &CancellationToken,
) -> Result<TerminalState, DeployerError>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let outcome = match sample(channel, handle, options, sleep_fn, cancel).await {
        Ok(TerminalState::Failed) => Err(failure(channel, handle).await),
        Ok(state) => {
            info!(
                "{} reached {:?} {}s after submission",
                handle.application,
                state,
                handle.elapsed().num_seconds()
            );
            Ok(state)
        }
        Err(e) => Err(e),
    };
    release(channel, handle).await;
    outcome
}

async fn failure(channel: &dyn ManagementChannel, handle: &ProgressHandle) -> DeployerError {
    let targets = match channel.get_attribute(&handle.object, "FailedTargets").await {
        Ok(value) => value.into_texts().unwrap_or_default(),
        Err(e) => {
            warn!("Failed to read the failed targets of {}: {}", handle.application, e);
            Vec::new()
        }
    };
    let Some(target) = targets.into_iter().next() else {
        return DeployerError::DeploymentFailed {
            target: "unknown".to_string(),
            detail: "the server reported no failed target".to_string(),
        };
    };

    let detail = match channel
        .invoke(&handle.object, "getExceptions", json!({ "target": target }))
        .await
    {
        Ok(MBeanValue::Text(text)) => text,
        Ok(MBeanValue::Texts(texts)) if !texts.is_empty() => texts.join("; "),
        Ok(_) => "no error detail was reported".to_string(),
        Err(e) => format!("the error detail could not be read: {}", e),
    };
    DeployerError::DeploymentFailed { target, detail }
}

/// Ask the server to drop the progress object. Best effort.
pub async fn release(channel: &dyn ManagementChannel, handle: &ProgressHandle) {
    let args = json!({ "applicationName": handle.application });
    match channel
        .invoke(&handle.deployment_manager, "removeDeploymentProgressObject", args)
        .await
    {
        Ok(_) => debug!("Released progress object {}", handle.object),
        Err(e) => warn!("Failed to release progress object {}: {}", handle.object, e),
    }
}
