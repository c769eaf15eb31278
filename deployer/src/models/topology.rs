//! Runtime topology models

use serde::{Deserialize, Serialize};

use crate::models::deployment::Servlet;

/// Server state that makes an instance eligible to serve a deployment
pub const RUNNING: &str = "RUNNING";

/// Component type carrying servlets
pub const WEB_APP_COMPONENT: &str = "WebAppComponentRuntime";

/// A server instance as the domain runtime reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInstance {
    pub name: String,
    pub state: String,

    /// HTTP base URL the server advertises, read only while it runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ServerInstance {
    pub fn is_running(&self) -> bool {
        self.state == RUNNING
    }
}

/// A deployed application on one server instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRuntime {
    pub name: String,
    pub components: Vec<ComponentRuntime>,
}

/// A module of a deployed application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRuntime {
    pub component_type: String,
    pub servlets: Vec<Servlet>,
}

impl ComponentRuntime {
    pub fn is_web_app(&self) -> bool {
        self.component_type == WEB_APP_COMPONENT
    }
}

/// What a deployment target is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Server,
    Cluster,
    Other,
}

impl TargetKind {
    pub fn from_type(target_type: &str) -> Self {
        match target_type {
            "Server" => TargetKind::Server,
            "Cluster" => TargetKind::Cluster,
            _ => TargetKind::Other,
        }
    }
}
