//! weblogic.Deployer command lines

use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;

use crate::app::options::Configuration;
use crate::security::context::TrustMode;
use crate::security::guard::TrustStoreState;
use crate::utils::mask;

/// Main class of the deployment tool
pub const DEPLOYER_MAIN_CLASS: &str = "weblogic.Deployer";

/// What the tool is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolAction {
    Deploy,
    Undeploy,
}

impl ToolAction {
    fn flag(&self) -> &'static str {
        match self {
            ToolAction::Deploy => "-deploy",
            ToolAction::Undeploy => "-undeploy",
        }
    }
}

/// A fully built tool invocation
#[derive(Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    password_index: usize,
}

impl ToolCommand {
    /// Build the invocation for one deployment
    pub fn build(
        config: &Configuration,
        action: ToolAction,
        name: &str,
        source: Option<&Path>,
        target: &str,
    ) -> Self {
        let mut args = vec!["-classpath".to_string(), config.tool.class_path.clone()];
        args.extend(system_properties(config));
        args.push(DEPLOYER_MAIN_CLASS.to_string());

        args.push("-adminurl".to_string());
        args.push(config.admin_url.clone());
        args.push("-username".to_string());
        args.push(config.admin_user_name.clone());
        args.push("-password".to_string());
        let password_index = args.len();
        args.push(config.admin_password.expose_secret().to_string());

        args.push(action.flag().to_string());
        args.push("-name".to_string());
        args.push(name.to_string());
        if let Some(source) = source {
            args.push("-source".to_string());
            args.push(source.display().to_string());
        }
        args.push("-targets".to_string());
        args.push(target.to_string());

        if action == ToolAction::Deploy {
            args.push("-upload".to_string());
        }
        args.push("-debug".to_string());
        if action == ToolAction::Deploy && config.remote_machine {
            args.push("-remote".to_string());
        }

        Self {
            program: config.tool.java_executable.clone(),
            args,
            env: Vec::new(),
            password_index,
        }
    }

    /// Hand the published trust store to the tool through its environment
    pub fn with_trust_store(mut self, trust: &TrustStoreState) -> Self {
        self.env = trust.child_env();
        self
    }

    #[cfg(test)]
    pub(crate) fn from_parts(program: &Path, args: Vec<String>) -> Self {
        Self {
            program: program.to_path_buf(),
            args,
            env: Vec::new(),
            password_index: usize::MAX,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Variables set on the child only, never logged
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// The command line with the password masked, safe to log
    pub fn masked(&self) -> String {
        let mut line = self.program.display().to_string();
        for (i, arg) in self.args.iter().enumerate() {
            line.push(' ');
            if i == self.password_index || is_secret_property(arg) {
                match arg.split_once('=') {
                    Some((key, value)) if arg.starts_with("-D") => {
                        line.push_str(key);
                        line.push('=');
                        line.push_str(mask(value));
                    }
                    _ => line.push_str(mask(arg)),
                }
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

impl std::fmt::Debug for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.masked())
    }
}

fn is_secret_property(arg: &str) -> bool {
    arg.starts_with("-D") && arg.contains("PassPhrase=")
}

/// Trust and SSL system properties for the tool's JVM
fn system_properties(config: &Configuration) -> Vec<String> {
    let security = &config.security;
    let password = security
        .password
        .as_ref()
        .map(|p| p.expose_secret().to_string())
        .filter(|p| !p.is_empty());
    let mut props = Vec::new();

    match security.mode {
        TrustMode::Default => {}
        TrustMode::Demo => {
            props.push("-Dweblogic.security.TrustKeyStore=DemoTrust".to_string());
        }
        TrustMode::Custom => {
            props.push("-Dweblogic.security.TrustKeyStore=CustomTrust".to_string());
            if let Some(location) = security.location.as_ref() {
                props.push(format!(
                    "-Dweblogic.security.CustomTrustKeyStoreFileName={}",
                    location.display()
                ));
            }
            props.push("-Dweblogic.security.TrustKeystoreType=jks".to_string());
            if let Some(password) = password.as_ref() {
                props.push(format!(
                    "-Dweblogic.security.CustomTrustKeyStorePassPhrase={}",
                    password
                ));
            }
        }
        TrustMode::JavaStandard => {
            props.push("-Dweblogic.security.TrustKeyStore=JavaStandardTrust".to_string());
            if let Some(password) = password.as_ref() {
                props.push(format!(
                    "-Dweblogic.security.JavaStandardTrustKeyStorePassPhrase={}",
                    password
                ));
            }
        }
    }

    if security.ignore_host_name_verification {
        props.push("-Dweblogic.security.SSL.ignoreHostnameVerification=true".to_string());
    }
    if let Some(verifier) = security.hostname_verifier_class.as_ref() {
        props.push(format!("-Dweblogic.security.SSL.hostnameVerifier={}", verifier));
    }
    if config.tool.use_urandom {
        props.push("-Djava.security.egd=file:/dev/./urandom".to_string());
    }
    props
}
