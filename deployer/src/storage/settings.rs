//! Settings file management

use serde::Deserialize;

use crate::logs::LogLevel;

/// Default settings file name, looked up in the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "wlsdeployer.json";

/// How deploy and undeploy commands reach the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStrategy {
    /// Fork the weblogic.Deployer tool
    #[default]
    Process,

    /// Call the deployment manager through the management channel
    Rest,
}

/// Deployer settings as read from disk, before validation.
///
/// Not `Debug`: it carries the admin password in clear text until it is
/// moved into a validated configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level
    pub log_level: LogLevel,

    /// Directory for a rolling log file
    pub log_dir: Option<String>,

    /// Admin server URL, `scheme://host:port`
    pub admin_url: String,

    /// Administrator user name
    pub admin_user_name: String,

    /// Administrator password
    pub admin_password: String,

    /// Deployment target: a managed server or a cluster name
    pub target: String,

    /// Management endpoint override, `scheme://host:port`
    pub management_url: Option<String>,

    /// WebLogic installation directory (`WL_HOME`)
    pub wl_home: Option<String>,

    /// Explicit path to weblogic.jar
    pub weblogic_jar_path: Option<String>,

    /// Extra classpath entries appended after weblogic.jar
    pub class_path: Option<String>,

    /// Java installation used to run weblogic.Deployer
    pub java_home: Option<String>,

    /// Submission strategy
    pub submission_strategy: SubmissionStrategy,

    /// Use the WebLogic demo trust store
    pub use_demo_trust: bool,

    /// Use a custom trust store at `trust_store_location`
    pub use_custom_trust: bool,

    /// Use the JDK cacerts trust store
    pub use_java_standard_trust: bool,

    /// Trust store location for custom trust
    pub trust_store_location: Option<String>,

    /// Trust store password
    pub trust_store_password: Option<String>,

    /// Skip hostname verification on TLS connections
    pub ignore_host_name_verification: bool,

    /// Custom hostname verifier class handed to weblogic.Deployer
    pub hostname_verifier_class: Option<String>,

    /// Seed weblogic.Deployer's RNG from /dev/urandom
    pub use_urandom: bool,

    /// The server does not share a filesystem with this machine
    pub remote_machine: bool,

    /// Maximum wait for a deployment operation to complete, in seconds
    pub deploy_timeout_secs: u64,

    /// Maximum wait for server start or stop, in seconds
    pub server_timeout_secs: u64,

    /// Maximum wait for the weblogic.Deployer process, in seconds
    pub tool_timeout_secs: u64,

    /// Timeout for each management request, in seconds
    pub request_timeout_secs: u64,

    /// Log management requests and responses at debug level
    pub log_rest_messages: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: None,
            admin_url: String::new(),
            admin_user_name: String::new(),
            admin_password: String::new(),
            target: String::new(),
            management_url: None,
            wl_home: None,
            weblogic_jar_path: None,
            class_path: None,
            java_home: None,
            submission_strategy: SubmissionStrategy::Process,
            use_demo_trust: false,
            use_custom_trust: false,
            use_java_standard_trust: false,
            trust_store_location: None,
            trust_store_password: None,
            ignore_host_name_verification: false,
            hostname_verifier_class: None,
            use_urandom: false,
            remote_machine: false,
            deploy_timeout_secs: 200,
            server_timeout_secs: 90,
            tool_timeout_secs: 600,
            request_timeout_secs: 30,
            log_rest_messages: false,
        }
    }
}
