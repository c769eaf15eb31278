//! Explicit TLS trust context
//!
//! Everything that needs trust material receives a `&SecurityContext`
//! instead of consulting process-wide settings.

use std::path::PathBuf;

use reqwest::Certificate;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::security::guard::TrustStoreState;

/// Which trust store the deployment connections rely on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrustMode {
    /// Built-in roots, nothing is configured
    #[default]
    Default,

    /// WebLogic's DemoTrust.jks
    Demo,

    /// A trust store supplied by the user
    Custom,

    /// The JDK's cacerts
    JavaStandard,
}

/// Trust material for connections to the domain
#[derive(Debug, Default)]
pub struct SecurityContext {
    pub mode: TrustMode,

    /// Trust store file, set for every mode but `Default`
    pub location: Option<PathBuf>,

    pub password: Option<SecretString>,

    pub ignore_host_name_verification: bool,

    /// Custom hostname verifier class for weblogic.Deployer
    pub hostname_verifier_class: Option<String>,
}

impl SecurityContext {
    /// Whether anything beyond the built-in defaults is configured
    pub fn is_configured(&self) -> bool {
        self.mode != TrustMode::Default
    }

    /// Trust store settings to publish while a channel is in use.
    ///
    /// `None` leaves the process settings untouched. A missing password keeps
    /// whatever password is already set.
    pub fn trust_store_state(&self) -> Option<TrustStoreState> {
        if !self.is_configured() {
            return None;
        }
        Some(TrustStoreState {
            location: self.location.as_ref().map(|p| p.display().to_string()),
            password: self
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string()),
        })
    }

    /// Extra root certificates for the management connection.
    ///
    /// PEM bundles (`.pem`, `.crt`, `.cer`) are loaded directly. Java
    /// standard trust adds the platform's native roots. Keystore formats the
    /// HTTP client cannot read contribute nothing; they are still handed to
    /// weblogic.Deployer.
    pub async fn root_certificates(&self) -> Result<Vec<Certificate>, DeployerError> {
        match self.mode {
            TrustMode::Default => Ok(Vec::new()),
            TrustMode::JavaStandard => {
                let native = rustls_native_certs::load_native_certs().unwrap_or_else(|e| {
                    warn!("Failed to load native root certificates: {}", e);
                    Vec::new()
                });
                native
                    .iter()
                    .map(|der| Certificate::from_der(der.as_ref()).map_err(DeployerError::from))
                    .collect()
            }
            TrustMode::Demo | TrustMode::Custom => {
                let Some(location) = self.location.as_ref() else {
                    return Ok(Vec::new());
                };
                if !is_pem_bundle(location) {
                    debug!(
                        "Trust store {} is not a PEM bundle, using built-in roots for the management connection",
                        location.display()
                    );
                    return Ok(Vec::new());
                }

                let bytes = File::new(location).read_bytes().await?;
                let mut reader = bytes.as_slice();
                let mut certs = Vec::new();
                for der in rustls_pemfile::certs(&mut reader) {
                    let der = der.map_err(|e| {
                        DeployerError::ConfigError(format!(
                            "Invalid certificate in {}: {}",
                            location.display(),
                            e
                        ))
                    })?;
                    certs.push(Certificate::from_der(der.as_ref())?);
                }
                if certs.is_empty() {
                    return Err(DeployerError::ConfigError(format!(
                        "No certificates found in {}",
                        location.display()
                    )));
                }
                Ok(certs)
            }
        }
    }
}

fn is_pem_bundle(path: &std::path::Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref(),
        Some("pem") | Some("crt") | Some("cer")
    )
}
