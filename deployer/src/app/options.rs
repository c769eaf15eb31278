//! Validated deployer configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::mgmt::admin_url::AdminUrl;
use crate::security::context::{SecurityContext, TrustMode};
use crate::storage::settings::{Settings, SubmissionStrategy};

const WEBLOGIC_JAR_PATH: &str = "server/lib/weblogic.jar";
const DEMO_TRUST_PATH: &str = "server/lib/DemoTrust.jks";
const STANDARD_TRUST_PATH: &str = "lib/security/cacerts";

#[cfg(windows)]
const CLASSPATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const CLASSPATH_SEPARATOR: &str = ":";

/// Timeouts used by the deployer
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Maximum wait for a deploy or undeploy to reach a terminal state
    pub deploy: Duration,

    /// Maximum wait for a server to start or stop
    pub server: Duration,

    /// Maximum wait for the weblogic.Deployer process to exit
    pub tool: Duration,

    /// Timeout applied to every management request
    pub request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            deploy: Duration::from_secs(200),
            server: Duration::from_secs(90),
            tool: Duration::from_secs(600),
            request: Duration::from_secs(30),
        }
    }
}

/// How to launch weblogic.Deployer
#[derive(Debug, Clone)]
pub struct ToolOptions {
    /// Java executable
    pub java_executable: PathBuf,

    /// Classpath, weblogic.jar first
    pub class_path: String,

    /// Seed the tool's RNG from /dev/urandom
    pub use_urandom: bool,
}

/// Configuration validated once per session and immutable afterwards
#[derive(Debug)]
pub struct Configuration {
    /// Admin URL exactly as configured, handed to weblogic.Deployer
    pub admin_url: String,

    /// Decomposed admin URL
    pub admin: AdminUrl,

    /// Endpoint of the management channel
    pub management: AdminUrl,

    /// Administrator user name
    pub admin_user_name: String,

    /// Administrator password
    pub admin_password: SecretString,

    /// Default deployment target
    pub target: String,

    /// Submission strategy
    pub submission_strategy: SubmissionStrategy,

    /// Trust material for TLS connections
    pub security: SecurityContext,

    /// weblogic.Deployer launch options
    pub tool: ToolOptions,

    /// The server does not share a filesystem with this machine
    pub remote_machine: bool,

    /// Timeouts
    pub timeouts: Timeouts,

    /// Log management requests and responses
    pub log_rest_messages: bool,
}

impl Configuration {
    /// Validate settings, reading `WL_HOME` and `JAVA_HOME` from the environment
    pub async fn from_settings(settings: Settings) -> Result<Self, DeployerError> {
        Self::from_settings_with_env(settings, |key| std::env::var(key).ok()).await
    }

    /// Validate settings against the given environment lookup
    pub async fn from_settings_with_env<E>(
        settings: Settings,
        env: E,
    ) -> Result<Self, DeployerError>
    where
        E: Fn(&str) -> Option<String>,
    {
        require(&settings.admin_url, "The admin_url is empty. Verify the settings file")?;
        require(
            &settings.admin_user_name,
            "The admin_user_name is empty. Verify the credentials in the settings file",
        )?;
        require(
            &settings.admin_password,
            "The admin_password is empty. Verify the credentials in the settings file",
        )?;
        require(
            &settings.target,
            "The target for the deployment is empty. Verify the settings file",
        )?;

        let admin = AdminUrl::parse(&settings.admin_url)?;
        let management = match non_empty(settings.management_url.as_deref()) {
            Some(raw) => AdminUrl::parse(raw)?,
            None => admin.clone(),
        };

        let wl_home = non_empty(settings.wl_home.as_deref())
            .map(PathBuf::from)
            .or_else(|| env("WL_HOME").filter(|v| !v.is_empty()).map(PathBuf::from));
        let java_home = non_empty(settings.java_home.as_deref())
            .map(PathBuf::from)
            .or_else(|| env("JAVA_HOME").filter(|v| !v.is_empty()).map(PathBuf::from));

        let security = resolve_security(&settings, wl_home.as_deref(), java_home.as_deref()).await?;
        let tool = resolve_tool(&settings, wl_home.as_deref(), java_home.as_deref()).await?;

        if settings.deploy_timeout_secs == 0 {
            return Err(DeployerError::ConfigError(
                "The deploy_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if settings.request_timeout_secs == 0 {
            return Err(DeployerError::ConfigError(
                "The request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            admin_url: settings.admin_url.trim().to_string(),
            admin,
            management,
            admin_user_name: settings.admin_user_name,
            admin_password: SecretString::from(settings.admin_password),
            target: settings.target,
            submission_strategy: settings.submission_strategy,
            security,
            tool,
            remote_machine: settings.remote_machine,
            timeouts: Timeouts {
                deploy: Duration::from_secs(settings.deploy_timeout_secs),
                server: Duration::from_secs(settings.server_timeout_secs),
                tool: Duration::from_secs(settings.tool_timeout_secs),
                request: Duration::from_secs(settings.request_timeout_secs),
            },
            log_rest_messages: settings.log_rest_messages,
        })
    }
}

fn require(value: &str, message: &str) -> Result<(), DeployerError> {
    if value.trim().is_empty() {
        return Err(DeployerError::ConfigError(message.to_string()));
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

async fn require_file(path: &Path, message: String) -> Result<(), DeployerError> {
    if !File::new(path).is_file().await {
        return Err(DeployerError::ConfigError(message));
    }
    Ok(())
}

async fn resolve_security(
    settings: &Settings,
    wl_home: Option<&Path>,
    java_home: Option<&Path>,
) -> Result<SecurityContext, DeployerError> {
    let selected = [
        settings.use_demo_trust,
        settings.use_custom_trust,
        settings.use_java_standard_trust,
    ]
    .iter()
    .filter(|flag| **flag)
    .count();
    if selected > 1 {
        return Err(DeployerError::ConfigError(
            "Only one of use_demo_trust, use_custom_trust and use_java_standard_trust may be true"
                .to_string(),
        ));
    }

    let (mode, location) = if settings.use_demo_trust {
        let wl_home = wl_home.ok_or_else(|| {
            DeployerError::ConfigError(
                "use_demo_trust requires wl_home or the WL_HOME environment variable".to_string(),
            )
        })?;
        let location = wl_home.join(DEMO_TRUST_PATH);
        require_file(
            &location,
            format!(
                "The DemoTrust.jks file was resolved to {} and could not be located. Verify wl_home",
                location.display()
            ),
        )
        .await?;
        (TrustMode::Demo, Some(location))
    } else if settings.use_custom_trust {
        let location = non_empty(settings.trust_store_location.as_deref())
            .map(PathBuf::from)
            .ok_or_else(|| {
                DeployerError::ConfigError(
                    "use_custom_trust requires trust_store_location".to_string(),
                )
            })?;
        require_file(
            &location,
            format!(
                "The trust store was resolved to {} and could not be located. Verify trust_store_location",
                location.display()
            ),
        )
        .await?;
        (TrustMode::Custom, Some(location))
    } else if settings.use_java_standard_trust {
        let java_home = java_home.ok_or_else(|| {
            DeployerError::ConfigError(
                "use_java_standard_trust requires java_home or the JAVA_HOME environment variable"
                    .to_string(),
            )
        })?;
        let location = java_home.join(STANDARD_TRUST_PATH);
        require_file(
            &location,
            format!(
                "The cacerts file was resolved to {} and could not be located. Verify the Java installation",
                location.display()
            ),
        )
        .await?;
        (TrustMode::JavaStandard, Some(location))
    } else {
        (TrustMode::Default, None)
    };

    Ok(SecurityContext {
        mode,
        location,
        password: non_empty(settings.trust_store_password.as_deref())
            .map(|p| SecretString::from(p.to_string())),
        ignore_host_name_verification: settings.ignore_host_name_verification,
        hostname_verifier_class: non_empty(settings.hostname_verifier_class.as_deref())
            .map(str::to_string),
    })
}

async fn resolve_tool(
    settings: &Settings,
    wl_home: Option<&Path>,
    java_home: Option<&Path>,
) -> Result<ToolOptions, DeployerError> {
    let weblogic_jar = non_empty(settings.weblogic_jar_path.as_deref())
        .map(PathBuf::from)
        .or_else(|| wl_home.map(|home| home.join(WEBLOGIC_JAR_PATH)));

    if settings.submission_strategy == SubmissionStrategy::Process {
        let jar = weblogic_jar.as_ref().ok_or_else(|| {
            DeployerError::ConfigError(
                "The process strategy requires wl_home, WL_HOME or weblogic_jar_path".to_string(),
            )
        })?;
        require_file(
            jar,
            format!(
                "The weblogic.jar could not be located at {}. Verify wl_home and weblogic_jar_path",
                jar.display()
            ),
        )
        .await?;
    }

    let mut class_path = weblogic_jar
        .map(|jar| jar.display().to_string())
        .unwrap_or_default();
    if let Some(extra) = non_empty(settings.class_path.as_deref()) {
        if !class_path.is_empty() {
            class_path.push_str(CLASSPATH_SEPARATOR);
        }
        class_path.push_str(extra);
    }

    let java_executable = match java_home {
        Some(home) => home.join("bin").join("java"),
        None => PathBuf::from("java"),
    };

    Ok(ToolOptions {
        java_executable,
        class_path,
        use_urandom: settings.use_urandom,
    })
}
