//! Utility functions

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Version information for the deployer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Derive the deployment name from an artifact file name.
///
/// The name is everything before the first `.`, so `foo.war` and
/// `foo.v2.ear` both deploy as `foo`. The server records the application
/// under this name, and it is the key used to find the deployment again.
pub fn deployment_name(file_name: &str) -> &str {
    match file_name.find('.') {
        Some(index) => &file_name[..index],
        None => file_name,
    }
}

/// Derive the deployment name from an artifact path
pub fn deployment_name_from_path(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| deployment_name(name).to_string())
}

/// Mask a secret for display, keeping nothing of its content
pub fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "********"
    }
}
