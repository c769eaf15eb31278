//! Management channel abstraction
//!
//! The deployer only ever talks to the server through this trait: reading
//! attributes of named remote objects and invoking operations on them. The
//! object names, attribute names and operation names are the ones the domain
//! runtime exposes (`ServerRuntimes`, `State`, `getURL`, ...); how they travel
//! over the wire is up to the implementation.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::app::options::Configuration;
use crate::errors::DeployerError;
use crate::security::context::SecurityContext;

/// Name of a remote management object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectName(String);

impl ObjectName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The domain runtime service, root of every lookup
    pub fn domain_runtime_service() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of a child object under this one
    pub fn child(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            Self(segment.to_string())
        } else {
            Self(format!("{}/{}", self.0, segment))
        }
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<domain runtime service>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Value of a remote attribute or operation result
#[derive(Debug, Clone, PartialEq)]
pub enum MBeanValue {
    Null,
    Bool(bool),
    Number(i64),
    Text(String),
    Texts(Vec<String>),
    Ref(ObjectName),
    Refs(Vec<ObjectName>),
}

impl MBeanValue {
    fn kind(&self) -> &'static str {
        match self {
            MBeanValue::Null => "null",
            MBeanValue::Bool(_) => "boolean",
            MBeanValue::Number(_) => "number",
            MBeanValue::Text(_) => "string",
            MBeanValue::Texts(_) => "string list",
            MBeanValue::Ref(_) => "object reference",
            MBeanValue::Refs(_) => "object reference list",
        }
    }

    fn unexpected(&self, wanted: &str) -> DeployerError {
        DeployerError::ProtocolError(format!("expected a {}, got a {}", wanted, self.kind()))
    }

    /// The value as a string
    pub fn into_text(self) -> Result<String, DeployerError> {
        match self {
            MBeanValue::Text(text) => Ok(text),
            other => Err(other.unexpected("string")),
        }
    }

    /// The value as a string list; null reads as empty
    pub fn into_texts(self) -> Result<Vec<String>, DeployerError> {
        match self {
            MBeanValue::Texts(texts) => Ok(texts),
            MBeanValue::Text(text) => Ok(vec![text]),
            MBeanValue::Null => Ok(Vec::new()),
            other => Err(other.unexpected("string list")),
        }
    }

    /// The value as a single object reference, `None` for null
    pub fn into_ref(self) -> Result<Option<ObjectName>, DeployerError> {
        match self {
            MBeanValue::Ref(name) => Ok(Some(name)),
            MBeanValue::Null => Ok(None),
            other => Err(other.unexpected("object reference")),
        }
    }

    /// The value as an object reference list; null reads as empty
    pub fn into_refs(self) -> Result<Vec<ObjectName>, DeployerError> {
        match self {
            MBeanValue::Refs(names) => Ok(names),
            MBeanValue::Ref(name) => Ok(vec![name]),
            MBeanValue::Null => Ok(Vec::new()),
            other => Err(other.unexpected("object reference list")),
        }
    }
}

/// An authenticated connection to the server's management interface
#[async_trait]
pub trait ManagementChannel: Send + Sync {
    /// Read an attribute of a remote object
    async fn get_attribute(
        &self,
        object: &ObjectName,
        attribute: &str,
    ) -> Result<MBeanValue, DeployerError>;

    /// Invoke an operation on a remote object with named arguments
    async fn invoke(
        &self,
        object: &ObjectName,
        operation: &str,
        args: Value,
    ) -> Result<MBeanValue, DeployerError>;

    /// Invoke an operation, uploading a local file along with the arguments
    async fn invoke_with_upload(
        &self,
        object: &ObjectName,
        operation: &str,
        args: Value,
        file: &Path,
    ) -> Result<MBeanValue, DeployerError>;

    /// Close the channel. Called exactly once per opened channel.
    async fn close(&self) -> Result<(), DeployerError>;
}

/// Opens management channels
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(
        &self,
        config: &Configuration,
        security: &SecurityContext,
    ) -> Result<Box<dyn ManagementChannel>, DeployerError>;
}

/// Read a required reference attribute
pub async fn get_ref(
    channel: &dyn ManagementChannel,
    object: &ObjectName,
    attribute: &str,
) -> Result<ObjectName, DeployerError> {
    channel
        .get_attribute(object, attribute)
        .await?
        .into_ref()?
        .ok_or_else(|| {
            DeployerError::ProtocolError(format!("{} of {} is null", attribute, object))
        })
}

/// Read a reference list attribute
pub async fn get_refs(
    channel: &dyn ManagementChannel,
    object: &ObjectName,
    attribute: &str,
) -> Result<Vec<ObjectName>, DeployerError> {
    channel.get_attribute(object, attribute).await?.into_refs()
}

/// Read a string attribute
pub async fn get_text(
    channel: &dyn ManagementChannel,
    object: &ObjectName,
    attribute: &str,
) -> Result<String, DeployerError> {
    channel.get_attribute(object, attribute).await?.into_text()
}
