//! Management channel over the RESTful management API
//!
//! Object names are resource paths under `/management/weblogic/latest`.
//! Attribute reads become `GET`s of the resource (or of a child collection),
//! operations become `POST`s to `<resource>/<operation>`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, error, info};
use url::Url;

use crate::app::options::Configuration;
use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::mgmt::channel::{ChannelConnector, MBeanValue, ManagementChannel, ObjectName};
use crate::security::context::SecurityContext;

const API_ROOT: &str = "management/weblogic/latest";
const REQUESTED_BY_HEADER: &str = "X-Requested-By";
const REQUESTED_BY: &str = "wlsdeployer";

/// How an attribute maps onto the resource tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeKind {
    /// A field of the resource
    Scalar,

    /// A single child resource
    Child,

    /// A child collection; each item is an object
    Children,

    /// A field holding identities of resources elsewhere in the tree
    References,
}

fn attribute_kind(attribute: &str) -> AttributeKind {
    match attribute {
        "DomainRuntime" | "DomainConfiguration" | "DeploymentManager" => AttributeKind::Child,
        "ServerRuntimes"
        | "AppDeployments"
        | "ApplicationRuntimes"
        | "ComponentRuntimes"
        | "Servlets"
        | "AppDeploymentRuntimes"
        | "DeploymentProgressObjects"
        | "Clusters" => AttributeKind::Children,
        "Targets" | "Servers" => AttributeKind::References,
        _ => AttributeKind::Scalar,
    }
}

/// `ServerRuntimes` -> `serverRuntimes`
fn field_name(attribute: &str) -> String {
    let mut chars = attribute.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Resource reached by a child or child-collection attribute
fn child_object(object: &ObjectName, attribute: &str) -> ObjectName {
    if object.is_root() {
        match attribute {
            "DomainConfiguration" => return ObjectName::new("domainConfig"),
            "ServerRuntimes" => return ObjectName::new("domainRuntime/serverRuntimes"),
            _ => {}
        }
    }
    object.child(&field_name(attribute))
}

/// First path segment: the tree identities are relative to
fn tree_root(object: &ObjectName) -> &str {
    object.as_str().split('/').next().unwrap_or_default()
}

/// `clusters` -> `Cluster`, used when the server omits a `type` field
fn type_from_collection(object: &ObjectName) -> Option<String> {
    let mut segments = object.as_str().rsplit('/');
    segments.next()?;
    let collection = segments.next()?;
    let singular = collection.strip_suffix('s').unwrap_or(collection);
    let mut chars = singular.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

fn identity_to_object(root: &str, identity: &[Value]) -> Option<ObjectName> {
    let mut name = ObjectName::new(root);
    for segment in identity {
        name = name.child(segment.as_str()?);
    }
    Some(name)
}

fn as_identity(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Object(map) => map.get("identity").and_then(Value::as_array),
        Value::Array(items) if items.iter().all(Value::is_string) && !items.is_empty() => {
            Some(items)
        }
        _ => None,
    }
}

/// Convert a JSON value from the management API
fn to_mbean_value(value: &Value, root: &str) -> MBeanValue {
    match value {
        Value::Null => MBeanValue::Null,
        Value::Bool(b) => MBeanValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(n) => MBeanValue::Number(n),
            None => MBeanValue::Text(n.to_string()),
        },
        Value::String(s) => MBeanValue::Text(s.clone()),
        Value::Array(items) if items.is_empty() => MBeanValue::Null,
        Value::Array(items) if items.iter().all(Value::is_string) => MBeanValue::Texts(
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
        ),
        Value::Array(items) => {
            let refs: Option<Vec<ObjectName>> = items
                .iter()
                .map(|item| as_identity(item).and_then(|id| identity_to_object(root, id)))
                .collect();
            match refs {
                Some(refs) => MBeanValue::Refs(refs),
                None => MBeanValue::Text(value.to_string()),
            }
        }
        Value::Object(map) => match map.get("identity").and_then(Value::as_array) {
            Some(identity) => identity_to_object(root, identity)
                .map(MBeanValue::Ref)
                .unwrap_or(MBeanValue::Null),
            None => MBeanValue::Text(value.to_string()),
        },
    }
}

/// Management channel bound to the RESTful management API
pub struct RestChannel {
    client: Client,
    base_url: Url,
    user_name: String,
    password: SecretString,
    log_messages: bool,
    closed: AtomicBool,
}

impl RestChannel {
    /// Create a channel without contacting the server
    pub fn new(
        client: Client,
        base_url: &str,
        user_name: &str,
        password: &str,
        log_messages: bool,
    ) -> Result<Self, DeployerError> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            DeployerError::ConfigError(format!("Invalid management URL {}: {}", base_url, e))
        })?;
        Ok(Self {
            client,
            base_url,
            user_name: user_name.to_string(),
            password: SecretString::from(password.to_string()),
            log_messages,
            closed: AtomicBool::new(false),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resource_url(&self, object: &ObjectName, extra: Option<&str>) -> Result<Url, DeployerError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                DeployerError::ConfigError(format!("{} cannot be a base URL", self.base_url))
            })?;
            segments.pop_if_empty();
            segments.extend(API_ROOT.split('/'));
            segments.extend(object.as_str().split('/').filter(|s| !s.is_empty()));
            if let Some(extra) = extra {
                segments.push(extra);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth(&self.user_name, Some(self.password.expose_secret()))
            .header(REQUESTED_BY_HEADER, REQUESTED_BY)
            .header(header::ACCEPT, "application/json")
    }

    fn ensure_open(&self) -> Result<(), DeployerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DeployerError::ProtocolError(
                "the management channel is closed".to_string(),
            ));
        }
        Ok(())
    }

    async fn read_body(&self, method: &str, url: &Url, response: Response) -> Result<Value, DeployerError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if self.log_messages {
            debug!("{} {} -> {} {}", method, url, status, body);
        }

        if !status.is_success() {
            error!("{} {} failed: {} - {}", method, url, status, body);
            return Err(DeployerError::ProtocolError(format!("{}: {}", status, body)));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Make a GET request
    async fn get(&self, object: &ObjectName, extra: Option<&str>, fields: &str) -> Result<Value, DeployerError> {
        self.ensure_open()?;
        let mut url = self.resource_url(object, extra)?;
        url.query_pairs_mut()
            .append_pair("fields", fields)
            .append_pair("links", "none");
        debug!("GET {}", url);

        let response = self.authorize(self.client.get(url.clone())).send().await?;
        self.read_body("GET", &url, response).await
    }

    /// Make a POST request with a JSON body
    async fn post(&self, object: &ObjectName, operation: &str, args: &Value) -> Result<Value, DeployerError> {
        self.ensure_open()?;
        let url = self.resource_url(object, Some(operation))?;
        debug!("POST {}", url);
        if self.log_messages {
            debug!("POST {} body: {}", url, args);
        }

        let response = self
            .authorize(self.client.post(url.clone()))
            .header("Prefer", "respond-async")
            .json(args)
            .send()
            .await?;
        self.read_body("POST", &url, response).await
    }

    fn operation_result(object: &ObjectName, body: &Value) -> MBeanValue {
        let root = tree_root(object);
        match body {
            Value::Object(map) if map.contains_key("return") => to_mbean_value(&map["return"], root),
            Value::Object(map) if map.contains_key("identity") => to_mbean_value(body, root),
            _ => MBeanValue::Null,
        }
    }
}

#[async_trait]
impl ManagementChannel for RestChannel {
    async fn get_attribute(
        &self,
        object: &ObjectName,
        attribute: &str,
    ) -> Result<MBeanValue, DeployerError> {
        match attribute_kind(attribute) {
            AttributeKind::Child => Ok(MBeanValue::Ref(child_object(object, attribute))),
            AttributeKind::Children => {
                let collection = child_object(object, attribute);
                let body = self.get(&collection, None, "name").await?;
                let items = body
                    .get("items")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let refs = items
                    .iter()
                    .filter_map(|item| item.get("name").and_then(Value::as_str))
                    .map(|name| collection.child(name))
                    .collect();
                Ok(MBeanValue::Refs(refs))
            }
            AttributeKind::References => {
                let field = field_name(attribute);
                let body = self.get(object, None, &field).await?;
                match body.get(&field) {
                    Some(value) => match to_mbean_value(value, "domainConfig") {
                        MBeanValue::Ref(name) => Ok(MBeanValue::Refs(vec![name])),
                        other => Ok(other),
                    },
                    None => Ok(MBeanValue::Null),
                }
            }
            AttributeKind::Scalar => {
                let field = field_name(attribute);
                let body = self.get(object, None, &field).await?;
                match body.get(&field) {
                    Some(value) => Ok(to_mbean_value(value, tree_root(object))),
                    None if attribute == "Type" => Ok(type_from_collection(object)
                        .map(MBeanValue::Text)
                        .unwrap_or(MBeanValue::Null)),
                    None if attribute == "Name" => Ok(object
                        .as_str()
                        .rsplit('/')
                        .next()
                        .map(|name| MBeanValue::Text(name.to_string()))
                        .unwrap_or(MBeanValue::Null)),
                    None => Ok(MBeanValue::Null),
                }
            }
        }
    }

    async fn invoke(
        &self,
        object: &ObjectName,
        operation: &str,
        args: Value,
    ) -> Result<MBeanValue, DeployerError> {
        let body = self.post(object, operation, &args).await?;
        Ok(Self::operation_result(object, &body))
    }

    async fn invoke_with_upload(
        &self,
        object: &ObjectName,
        operation: &str,
        args: Value,
        file: &Path,
    ) -> Result<MBeanValue, DeployerError> {
        self.ensure_open()?;
        let upload = File::new(file);
        let bytes = upload.read_bytes().await?;
        let file_name = upload.file_name().unwrap_or("deployment").to_string();
        let url = self.resource_url(object, Some(operation))?;
        debug!("POST {} (upload of {}, {} bytes)", url, file_name, bytes.len());

        let form = Form::new()
            .part("model", Part::text(args.to_string()).mime_str("application/json")?)
            .part(
                "sourcePath",
                Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str("application/octet-stream")?,
            );

        let response = self
            .authorize(self.client.post(url.clone()))
            .header("Prefer", "respond-async")
            .multipart(form)
            .send()
            .await?;
        let body = self.read_body("POST", &url, response).await?;
        Ok(Self::operation_result(object, &body))
    }

    async fn close(&self) -> Result<(), DeployerError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closed management channel to {}", self.base_url);
        }
        Ok(())
    }
}

/// Opens [`RestChannel`]s
#[derive(Debug, Default)]
pub struct RestConnector;

#[async_trait]
impl ChannelConnector for RestConnector {
    async fn open(
        &self,
        config: &Configuration,
        security: &SecurityContext,
    ) -> Result<Box<dyn ManagementChannel>, DeployerError> {
        let mut builder = Client::builder().timeout(config.timeouts.request);
        for certificate in security.root_certificates().await? {
            builder = builder.add_root_certificate(certificate);
        }
        if security.ignore_host_name_verification {
            builder = builder.danger_accept_invalid_hostnames(true);
        }
        let client = builder
            .build()
            .map_err(|e| DeployerError::ConnectError(e.to_string()))?;

        let channel = RestChannel::new(
            client,
            &config.management.http_base(),
            &config.admin_user_name,
            config.admin_password.expose_secret(),
            config.log_rest_messages,
        )?;

        // One authenticated read proves the endpoint and the credentials.
        channel
            .get(&ObjectName::new("domainRuntime"), None, "name")
            .await
            .map_err(|e| {
                DeployerError::ConnectError(format!(
                    "{} ({}). Verify the admin channel is reachable and no firewall blocks it",
                    config.management, e
                ))
            })?;

        info!("Connected to the management endpoint at {}", config.management);
        Ok(Box::new(channel))
    }
}
