//! Tool registry
//!
//! Every tool maps one call (sometimes a short sequence of calls) onto the
//! Proxmox REST API. Tools are grouped by area; each group exposes its
//! definitions and a dispatcher that returns `None` for names it does not own.

mod access;
mod admin;
mod cluster;
mod containers;
mod datacenter;
mod generic;
mod nodes;
mod schema;
mod storage;
mod vms;

pub use containers::{parse_selector, resolve_selector, ContainerRef, SelectorToken, Target};

use crate::proxmox::{Params, ProxmoxApi, ProxmoxError};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Tool errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Precondition(String),

    #[error("Failed to {action}: {source}")]
    Api {
        action: String,
        #[source]
        source: ProxmoxError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProxmoxError> for ToolError {
    fn from(source: ProxmoxError) -> Self {
        ToolError::Api {
            action: "call the Proxmox API".to_string(),
            source,
        }
    }
}

/// Attach the attempted action to a Proxmox error
pub(crate) trait Context<T> {
    fn context(self, action: impl Into<String>) -> Result<T, ToolError>;
}

impl<T> Context<T> for Result<T, ProxmoxError> {
    fn context(self, action: impl Into<String>) -> Result<T, ToolError> {
        self.map_err(|source| ToolError::Api {
            action: action.into(),
            source,
        })
    }
}

/// Tool metadata as advertised over MCP and OpenAPI
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Result of a successful tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Text returned to the caller
    pub text: String,
    /// Structured form of `text` when it is JSON
    pub data: Option<Value>,
}

impl ToolOutput {
    /// Compact JSON text
    pub fn json(value: Value) -> Self {
        Self {
            text: value.to_string(),
            data: Some(value),
        }
    }

    /// Indented JSON text
    pub fn pretty(value: Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        Self {
            text,
            data: Some(value),
        }
    }

    /// Wrap an asynchronous task id
    pub fn task(upid: Value) -> Self {
        Self::json(serde_json::json!({ "task": upid }))
    }

    /// Plain human-readable text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }
}

/// Every tool definition, in listing order
pub fn all_definitions() -> Vec<ToolDefinition> {
    [
        nodes::definitions(),
        vms::definitions(),
        containers::definitions(),
        storage::definitions(),
        cluster::definitions(),
        access::definitions(),
        datacenter::definitions(),
        admin::definitions(),
        generic::definitions(),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// The full set of Proxmox tools bound to one API connection
pub struct ToolRegistry {
    api: Arc<dyn ProxmoxApi>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new(api: Arc<dyn ProxmoxApi>) -> Self {
        Self {
            api,
            definitions: all_definitions(),
        }
    }

    /// The underlying API handle
    pub fn api(&self) -> &Arc<dyn ProxmoxApi> {
        &self.api
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Invoke a tool by name
    pub async fn call(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        if !self.contains(name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }

        let args = match args {
            Value::Null => Value::Object(Default::default()),
            Value::Object(_) => args,
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "arguments must be an object, got {}",
                    type_name(&other)
                )))
            }
        };

        info!(tool = %name, "Calling tool");
        let started = Instant::now();
        let result = self.dispatch(name, &args).await;

        match &result {
            Ok(_) => debug!(tool = %name, elapsed_ms = started.elapsed().as_millis() as u64, "Tool completed"),
            Err(e) => warn!(tool = %name, error = %e, "Tool failed"),
        }

        result
    }

    async fn dispatch(&self, name: &str, args: &Value) -> Result<ToolOutput, ToolError> {
        let api = self.api.as_ref();

        if let Some(result) = nodes::call(api, name, args).await {
            return result;
        }
        if let Some(result) = vms::call(api, name, args).await {
            return result;
        }
        if let Some(result) = containers::call(api, name, args).await {
            return result;
        }
        if let Some(result) = storage::call(api, name, args).await {
            return result;
        }
        if let Some(result) = cluster::call(api, name, args).await {
            return result;
        }
        if let Some(result) = access::call(api, name, args).await {
            return result;
        }
        if let Some(result) = datacenter::call(api, name, args).await {
            return result;
        }
        if let Some(result) = admin::call(api, name, args).await {
            return result;
        }
        if let Some(result) = generic::call(api, name, args).await {
            return result;
        }

        Err(ToolError::UnknownTool(name.to_string()))
    }
}

/// Deserialize tool arguments into a typed struct
pub(crate) fn parse_args<T: DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Check a value that is interpolated into an API path
pub(crate) fn segment<'a>(field: &str, value: &'a str) -> Result<&'a str, ToolError> {
    let value = value.trim();
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '?', '#', '\\'])
    {
        return Err(ToolError::InvalidArguments(format!(
            "{} '{}' is not a valid identifier",
            field, value
        )));
    }
    Ok(value)
}

/// Like [`segment`] but allows `/` inside volume ids such as `local:iso/x.iso`
pub(crate) fn volume_path<'a>(field: &str, value: &'a str) -> Result<&'a str, ToolError> {
    let value = value.trim();
    if value.is_empty()
        || value.contains(['?', '#', '\\'])
        || value.split('/').any(|s| s.is_empty() || s == "." || s == "..")
    {
        return Err(ToolError::InvalidArguments(format!(
            "{} '{}' is not a valid volume id",
            field, value
        )));
    }
    Ok(value)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Guest id, accepted as a number or a numeric string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vmid(pub u32);

impl Vmid {
    pub const MIN: u32 = 100;
    pub const MAX: u32 = 999_999_999;

    pub fn new(id: u64) -> Result<Self, String> {
        if (Self::MIN as u64..=Self::MAX as u64).contains(&id) {
            Ok(Self(id as u32))
        } else {
            Err(format!(
                "vmid must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                id
            ))
        }
    }
}

impl fmt::Display for Vmid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Vmid> for Value {
    fn from(vmid: Vmid) -> Self {
        Value::from(vmid.0)
    }
}

impl<'de> Deserialize<'de> for Vmid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        let id = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => n,
            Raw::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| de::Error::custom(format!("vmid must be numeric, got '{}'", s)))?,
        };
        Vmid::new(id).map_err(de::Error::custom)
    }
}

/// Insert `key` only when a value is present
pub(crate) fn insert_opt<V: Into<Value>>(params: &mut Params, key: &str, value: Option<V>) {
    if let Some(value) = value {
        params.insert(key.to_string(), value.into());
    }
}

/// Read a number that Proxmox may report as a JSON number or a string
pub(crate) fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a field as a string, converting numbers
pub(crate) fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
