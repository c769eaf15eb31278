//! Admin URL decomposition

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::errors::DeployerError;

/// Protocols the admin server listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    T3,
    T3s,
    Http,
    Https,
    Iiop,
    Iiops,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::T3 => "t3",
            Protocol::T3s => "t3s",
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Iiop => "iiop",
            Protocol::Iiops => "iiops",
        }
    }

    /// Whether the protocol runs over TLS
    pub fn is_secure(&self) -> bool {
        matches!(self, Protocol::T3s | Protocol::Https | Protocol::Iiops)
    }

    /// The HTTP scheme that reaches the same listen port
    pub fn http_scheme(&self) -> &'static str {
        if self.is_secure() {
            "https"
        } else {
            "http"
        }
    }

    /// Listen port assumed when the URL omits one
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
            Protocol::T3 | Protocol::Iiop => 7001,
            Protocol::T3s | Protocol::Iiops => 7002,
        }
    }
}

impl FromStr for Protocol {
    type Err = DeployerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "t3" => Ok(Protocol::T3),
            "t3s" => Ok(Protocol::T3s),
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "iiop" => Ok(Protocol::Iiop),
            "iiops" => Ok(Protocol::Iiops),
            other => Err(DeployerError::ConfigError(format!(
                "The protocol {} is invalid. It must be either t3, t3s, http, https, iiop or iiops",
                other
            ))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A management endpoint address decomposed into protocol, host and port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminUrl {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl AdminUrl {
    /// Parse `scheme://host[:port]`
    pub fn parse(raw: &str) -> Result<Self, DeployerError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DeployerError::ConfigError(
                "The admin URL is empty".to_string(),
            ));
        }

        let url = Url::parse(raw).map_err(|e| {
            DeployerError::ConfigError(format!("Failed to parse the admin URL {}: {}", raw, e))
        })?;

        let protocol: Protocol = url.scheme().parse()?;

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| {
                DeployerError::ConfigError(format!("The admin URL {} has no host", raw))
            })?
            .to_string();

        let port = url
            .port_or_known_default()
            .unwrap_or_else(|| protocol.default_port());

        Ok(Self {
            protocol,
            host,
            port,
        })
    }

    /// Base URL of the REST management API on this endpoint
    pub fn http_base(&self) -> String {
        format!("{}://{}:{}", self.protocol.http_scheme(), self.host, self.port)
    }
}

impl fmt::Display for AdminUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}
