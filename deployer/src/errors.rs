//! Error types for the deployer

use thiserror::Error;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to connect to the management endpoint: {0}")]
    ConnectError(String),

    #[error("Deployment submission failed: {0}")]
    SubmissionError(String),

    #[error("Deployment failed on target {target}: {detail}")]
    DeploymentFailed { target: String, detail: String },

    #[error("Deployment {0} could not be found in the domain configuration. The deployment must have failed; inspect the submission output")]
    DeploymentNotFound(String),

    #[error("Deployment details were not found on the running target: {0}")]
    ApplicationRuntimeNotFound(String),

    #[error("Deployment {deployment} is not targeted to {target}")]
    TargetNotFound { deployment: String, target: String },

    #[error("None of the targets of {0} are in the RUNNING state")]
    TargetNotRunning(String),

    #[error("Deployment {0} is still present after undeploy")]
    UndeployVerification(String),

    #[error("Failed to restore the process trust settings: {0}")]
    GuardCleanup(String),

    #[error("Unexpected response from the management endpoint: {0}")]
    ProtocolError(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{primary}")]
    Suppressed {
        primary: Box<DeployerError>,
        suppressed: Vec<DeployerError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Where a failed call broke down. Each phase calls for a different response
/// from whoever reads the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    /// The configuration is invalid; fix it before retrying.
    Configuration,

    /// The management endpoint could not be reached; the whole call may be retried.
    Connection,

    /// Submitting the operation failed; the whole call may be retried.
    Submission,

    /// Submission likely succeeded but the runtime graph did not confirm it;
    /// inspect the server logs.
    Verification,

    /// The server confirmed the failure; fix the application or the target.
    ConfirmedFailure,

    /// Anything else (I/O, cancellation, internal faults).
    Other,
}

impl DeployerError {
    /// Classify the error. Attached cleanup errors never change the phase.
    pub fn phase(&self) -> FailurePhase {
        match self {
            DeployerError::ConfigError(_) => FailurePhase::Configuration,
            DeployerError::ConnectError(_) => FailurePhase::Connection,
            DeployerError::SubmissionError(_) => FailurePhase::Submission,
            DeployerError::DeploymentFailed { .. } => FailurePhase::ConfirmedFailure,
            DeployerError::DeploymentNotFound(_)
            | DeployerError::ApplicationRuntimeNotFound(_)
            | DeployerError::TargetNotFound { .. }
            | DeployerError::TargetNotRunning(_)
            | DeployerError::UndeployVerification(_) => FailurePhase::Verification,
            DeployerError::Suppressed { primary, .. } => primary.phase(),
            _ => FailurePhase::Other,
        }
    }

    /// The error that caused the failure, looking through attached cleanup errors
    pub fn primary(&self) -> &DeployerError {
        match self {
            DeployerError::Suppressed { primary, .. } => primary.primary(),
            other => other,
        }
    }

    /// Cleanup errors attached to this error
    pub fn suppressed(&self) -> &[DeployerError] {
        match self {
            DeployerError::Suppressed { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// Attach cleanup errors. The receiver stays the primary error.
    pub fn with_suppressed(self, mut errors: Vec<DeployerError>) -> DeployerError {
        if errors.is_empty() {
            return self;
        }
        match self {
            DeployerError::Suppressed {
                primary,
                mut suppressed,
            } => {
                suppressed.append(&mut errors);
                DeployerError::Suppressed { primary, suppressed }
            }
            other => DeployerError::Suppressed {
                primary: Box::new(other),
                suppressed: errors,
            },
        }
    }
}

impl From<anyhow::Error> for DeployerError {
    fn from(err: anyhow::Error) -> Self {
        DeployerError::Internal(err.to_string())
    }
}
