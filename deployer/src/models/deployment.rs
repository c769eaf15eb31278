//! Deployment models

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::mgmt::channel::ObjectName;
use crate::utils::deployment_name;

/// A request to deploy one artifact to one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    /// Deployment name, the artifact file name up to its first `.`
    pub name: String,
    pub artifact_path: PathBuf,
    pub target: String,
}

impl DeploymentRequest {
    /// Build a request for an artifact that must already exist on disk
    pub async fn from_artifact(
        artifact_path: impl Into<PathBuf>,
        target: impl Into<String>,
    ) -> Result<Self, DeployerError> {
        let artifact = File::new(artifact_path);
        if !artifact.exists().await {
            return Err(DeployerError::ConfigError(format!(
                "The artifact {} does not exist",
                artifact.path().display()
            )));
        }
        let name = artifact
            .file_name()
            .map(deployment_name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                DeployerError::ConfigError(format!(
                    "Cannot derive a deployment name from {}",
                    artifact.path().display()
                ))
            })?
            .to_string();

        Ok(Self {
            name,
            artifact_path: artifact.path().to_path_buf(),
            target: target.into(),
        })
    }
}

/// A servlet exposed by a deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Servlet {
    pub name: String,
    pub context_path: String,
}

impl Servlet {
    pub fn new(name: impl Into<String>, context_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context_path: context_path.into(),
        }
    }
}

/// Where a live deployment is served
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub host: String,
    pub port: u16,
    pub servlets: Vec<Servlet>,
}

/// Handle to an in-flight deployment operation on the server
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    /// The progress object
    pub object: ObjectName,

    /// Deployment manager that owns the progress object
    pub deployment_manager: ObjectName,

    /// Application the operation acts on
    pub application: String,

    pub submitted_at: DateTime<Utc>,
}

impl ProgressHandle {
    /// Time since the operation was submitted
    pub fn elapsed(&self) -> Duration {
        Utc::now().signed_duration_since(self.submitted_at)
    }
}
