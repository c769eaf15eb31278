//! Runtime topology resolution
//!
//! The submission channel and the runtime graph can disagree for a while
//! after a deploy, so whether an application is actually servable is always
//! read back from the domain's configuration and runtime objects.

use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::errors::DeployerError;
use crate::mgmt::channel::{get_ref, get_refs, get_text, ManagementChannel, ObjectName};
use crate::models::deployment::{EndpointInfo, Servlet};
use crate::models::topology::{ApplicationRuntime, ComponentRuntime, ServerInstance, TargetKind};

/// Reads deployments and server runtimes through a management channel
pub struct Resolver<'a> {
    channel: &'a dyn ManagementChannel,
}

impl<'a> Resolver<'a> {
    pub fn new(channel: &'a dyn ManagementChannel) -> Self {
        Self { channel }
    }

    fn root() -> ObjectName {
        ObjectName::domain_runtime_service()
    }

    async fn domain_configuration(&self) -> Result<ObjectName, DeployerError> {
        get_ref(self.channel, &Self::root(), "DomainConfiguration").await
    }

    /// The application deployment record named `name`, if configured
    pub async fn find_deployment(&self, name: &str) -> Result<Option<ObjectName>, DeployerError> {
        let domain = self.domain_configuration().await?;
        for deployment in get_refs(self.channel, &domain, "AppDeployments").await? {
            if get_text(self.channel, &deployment, "Name").await? == name {
                return Ok(Some(deployment));
            }
        }
        Ok(None)
    }

    /// Whether no deployment named `name` is configured
    pub async fn confirm_absent(&self, name: &str) -> Result<bool, DeployerError> {
        Ok(self.find_deployment(name).await?.is_none())
    }

    /// Where a deployment is served on `target`
    pub async fn build_endpoint(&self, name: &str, target: &str) -> Result<EndpointInfo, DeployerError> {
        let deployment = self
            .find_deployment(name)
            .await?
            .ok_or_else(|| DeployerError::DeploymentNotFound(name.to_string()))?;

        let target_object = self.find_target(&deployment, name, target).await?;
        let target_type = get_text(self.channel, &target_object, "Type").await?;
        let members = match TargetKind::from_type(&target_type) {
            TargetKind::Server => vec![target.to_string()],
            TargetKind::Cluster => self.cluster_members(&target_object).await?,
            TargetKind::Other => {
                debug!("Target {} is a {}, not a server or cluster", target, target_type);
                Vec::new()
            }
        };

        let (runtime, instance) = self
            .running_instances(&members)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DeployerError::TargetNotRunning(target.to_string()))?;
        debug!("Resolving {} through {}", name, instance.name);

        let (host, port) = server_address(&instance)?;
        let application = self.application_runtime(&runtime, name).await?;
        let servlets = application
            .components
            .into_iter()
            .filter(ComponentRuntime::is_web_app)
            .flat_map(|component| component.servlets)
            .collect();

        info!("{} is served by {} at {}:{}", name, instance.name, host, port);
        Ok(EndpointInfo {
            host,
            port,
            servlets,
        })
    }

    /// Live server instances of the domain
    pub async fn list_servers(&self) -> Result<Vec<ServerInstance>, DeployerError> {
        let mut servers = Vec::new();
        for (_, instance) in self.server_runtimes().await? {
            servers.push(instance);
        }
        Ok(servers)
    }

    /// Whether a server target is running, or any member of a cluster target
    pub async fn is_target_running(&self, target: &str) -> Result<bool, DeployerError> {
        let servers = self.list_servers().await?;
        if let Some(server) = servers.iter().find(|s| s.name == target) {
            return Ok(server.is_running());
        }

        let domain = self.domain_configuration().await?;
        for cluster in get_refs(self.channel, &domain, "Clusters").await? {
            if get_text(self.channel, &cluster, "Name").await? != target {
                continue;
            }
            let members = self.cluster_members(&cluster).await?;
            return Ok(servers
                .iter()
                .any(|s| s.is_running() && members.contains(&s.name)));
        }
        Ok(false)
    }

    async fn find_target(
        &self,
        deployment: &ObjectName,
        name: &str,
        target: &str,
    ) -> Result<ObjectName, DeployerError> {
        for candidate in get_refs(self.channel, deployment, "Targets").await? {
            if get_text(self.channel, &candidate, "Name").await? == target {
                return Ok(candidate);
            }
        }
        Err(DeployerError::TargetNotFound {
            deployment: name.to_string(),
            target: target.to_string(),
        })
    }

    async fn cluster_members(&self, cluster: &ObjectName) -> Result<Vec<String>, DeployerError> {
        let mut members = Vec::new();
        for server in get_refs(self.channel, cluster, "Servers").await? {
            members.push(get_text(self.channel, &server, "Name").await?);
        }
        Ok(members)
    }

    async fn server_runtimes(&self) -> Result<Vec<(ObjectName, ServerInstance)>, DeployerError> {
        let mut runtimes = Vec::new();
        for runtime in get_refs(self.channel, &Self::root(), "ServerRuntimes").await? {
            let mut instance = ServerInstance {
                name: get_text(self.channel, &runtime, "Name").await?,
                state: get_text(self.channel, &runtime, "State").await?,
                base_url: None,
            };
            if instance.is_running() {
                instance.base_url = Some(self.base_url(&runtime).await?);
            }
            runtimes.push((runtime, instance));
        }
        Ok(runtimes)
    }

    /// Running instances among `members`, in the order the domain lists them
    async fn running_instances(
        &self,
        members: &[String],
    ) -> Result<Vec<(ObjectName, ServerInstance)>, DeployerError> {
        if members.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .server_runtimes()
            .await?
            .into_iter()
            .filter(|(_, instance)| instance.is_running() && members.contains(&instance.name))
            .collect())
    }

    async fn base_url(&self, runtime: &ObjectName) -> Result<String, DeployerError> {
        self.channel
            .invoke(runtime, "getURL", json!({ "protocol": "http" }))
            .await?
            .into_text()
    }

    async fn application_runtime(
        &self,
        runtime: &ObjectName,
        name: &str,
    ) -> Result<ApplicationRuntime, DeployerError> {
        for application in get_refs(self.channel, runtime, "ApplicationRuntimes").await? {
            if get_text(self.channel, &application, "Name").await? != name {
                continue;
            }
            let mut components = Vec::new();
            for component in get_refs(self.channel, &application, "ComponentRuntimes").await? {
                components.push(self.component_runtime(&component).await?);
            }
            return Ok(ApplicationRuntime {
                name: name.to_string(),
                components,
            });
        }
        Err(DeployerError::ApplicationRuntimeNotFound(name.to_string()))
    }

    async fn component_runtime(&self, component: &ObjectName) -> Result<ComponentRuntime, DeployerError> {
        let mut runtime = ComponentRuntime {
            component_type: get_text(self.channel, component, "Type").await?,
            servlets: Vec::new(),
        };
        if !runtime.is_web_app() {
            return Ok(runtime);
        }
        for servlet in get_refs(self.channel, component, "Servlets").await? {
            runtime.servlets.push(Servlet::new(
                get_text(self.channel, &servlet, "ServletName").await?,
                get_text(self.channel, &servlet, "ContextPath").await?,
            ));
        }
        Ok(runtime)
    }
}

/// Host and port of the URL a running instance advertises
fn server_address(instance: &ServerInstance) -> Result<(String, u16), DeployerError> {
    let raw = instance.base_url.as_deref().ok_or_else(|| {
        DeployerError::ProtocolError(format!("{} advertised no URL", instance.name))
    })?;
    let url = Url::parse(raw).map_err(|e| {
        DeployerError::ProtocolError(format!(
            "{} advertised an invalid URL {}: {}",
            instance.name, raw, e
        ))
    })?;
    let host = url
        .host_str()
        .ok_or_else(|| DeployerError::ProtocolError(format!("No host in {}", raw)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| DeployerError::ProtocolError(format!("No port in {}", raw)))?;
    Ok((host.to_string(), port))
}
