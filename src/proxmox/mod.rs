//! Proxmox VE REST API access
//!
//! Tools talk to Proxmox through the [`ProxmoxApi`] trait. The production
//! implementation is [`ProxmoxClient`]; [`fake::FakeApi`] answers from
//! canned responses.

mod client;
pub mod fake;

pub use client::ProxmoxClient;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Request parameters, sent as query string or form body
pub type Params = serde_json::Map<String, Value>;

/// HTTP methods the Proxmox API uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl ApiMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::Get => "GET",
            ApiMethod::Post => "POST",
            ApiMethod::Put => "PUT",
            ApiMethod::Delete => "DELETE",
        }
    }

    /// Whether parameters travel in a form body
    pub fn has_body(&self) -> bool {
        matches!(self, ApiMethod::Post | ApiMethod::Put)
    }
}

impl std::str::FromStr for ApiMethod {
    type Err = ProxmoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(ApiMethod::Get),
            "POST" => Ok(ApiMethod::Post),
            "PUT" => Ok(ApiMethod::Put),
            "DELETE" => Ok(ApiMethod::Delete),
            other => Err(ProxmoxError::InvalidMethod(other.to_string())),
        }
    }
}

impl std::fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proxmox API errors
#[derive(Error, Debug, Clone)]
pub enum ProxmoxError {
    #[error("Invalid API path '{0}'")]
    InvalidPath(String),

    #[error("Unsupported HTTP method '{0}' (expected GET, POST, PUT or DELETE)")]
    InvalidMethod(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error(
        "Authentication failed ({status}): {message}. Check that the token is configured as \
         user@realm!token_name with its secret and that it has the required privileges"
    )]
    Unauthorized { status: u16, message: String },

    #[error(
        "TLS error: {0}. For self-signed certificates set proxmox.verify_ssl=false \
         (or PROXMOX_VERIFY_SSL=false)"
    )]
    Tls(String),

    #[error("Proxmox API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Connection error: {0}")]
    Transport(String),

    #[error("Invalid response from Proxmox: {0}")]
    Decode(String),
}

impl ProxmoxError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ProxmoxError::Unauthorized { status, .. } | ProxmoxError::Api { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Whether Proxmox reported the target as missing
    ///
    /// Proxmox answers most lookups of unknown guests with a 500 whose
    /// message says "does not exist", so the message is checked too.
    pub fn is_not_found(&self) -> bool {
        match self {
            ProxmoxError::Api { status, message } => {
                let message = message.to_ascii_lowercase();
                *status == 404
                    || message.contains("does not exist")
                    || message.contains("not found")
                    || message.contains("no such")
            }
            _ => false,
        }
    }
}

/// Access to the Proxmox REST API
///
/// Paths are relative to `/api2/json/`; a leading slash or an
/// `api2/json/` prefix is accepted. Results are the unwrapped `data` field.
#[async_trait]
pub trait ProxmoxApi: Send + Sync {
    /// Issue a request
    async fn request(
        &self,
        method: ApiMethod,
        path: &str,
        params: Params,
    ) -> Result<Value, ProxmoxError>;

    /// Upload a file as multipart form data
    async fn upload(
        &self,
        path: &str,
        fields: Params,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<Value, ProxmoxError>;

    async fn get(&self, path: &str) -> Result<Value, ProxmoxError> {
        self.request(ApiMethod::Get, path, Params::new()).await
    }

    async fn get_with(&self, path: &str, params: Params) -> Result<Value, ProxmoxError> {
        self.request(ApiMethod::Get, path, params).await
    }

    async fn post(&self, path: &str, params: Params) -> Result<Value, ProxmoxError> {
        self.request(ApiMethod::Post, path, params).await
    }

    async fn put(&self, path: &str, params: Params) -> Result<Value, ProxmoxError> {
        self.request(ApiMethod::Put, path, params).await
    }

    async fn delete(&self, path: &str, params: Params) -> Result<Value, ProxmoxError> {
        self.request(ApiMethod::Delete, path, params).await
    }
}

/// Split an API path into its segments
pub fn normalize_path(path: &str) -> Result<Vec<String>, ProxmoxError> {
    let trimmed = path.trim().trim_start_matches('/');
    let trimmed = trimmed
        .strip_prefix("api2/json/")
        .or_else(|| trimmed.strip_prefix("api2/json"))
        .unwrap_or(trimmed);

    if trimmed.contains(['?', '#']) {
        return Err(ProxmoxError::InvalidPath(format!(
            "{} (pass query values as params)",
            path
        )));
    }

    let segments: Vec<String> = trimmed
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if segments.is_empty() || segments.iter().any(|s| s == "." || s == "..") {
        return Err(ProxmoxError::InvalidPath(path.to_string()));
    }

    Ok(segments)
}

/// Flatten parameters into key/value pairs for the query string or form body
///
/// Booleans become `1`/`0`, arrays repeat the key, nested objects are sent
/// as JSON text and nulls are dropped.
pub fn form_pairs(params: &Params) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());

    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(text) = scalar_text(item) {
                        pairs.push((key.clone(), text));
                    }
                }
            }
            other => {
                if let Some(text) = scalar_text(other) {
                    pairs.push((key.clone(), text));
                }
            }
        }
    }

    pairs
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Probe the API with `GET version`
///
/// Returns the reported version string.
pub async fn connectivity_check(api: &dyn ProxmoxApi) -> Result<String, ProxmoxError> {
    let version = api.get("version").await?;
    Ok(version
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/nodes/pve/qemu").unwrap(), vec!["nodes", "pve", "qemu"]);
        assert_eq!(normalize_path("api2/json/version").unwrap(), vec!["version"]);
        assert_eq!(normalize_path("/api2/json/cluster//status/").unwrap(), vec!["cluster", "status"]);
    }

    #[test]
    fn test_normalize_path_rejects() {
        assert!(normalize_path("").is_err());
        assert!(normalize_path("/").is_err());
        assert!(normalize_path("/api2/json/").is_err());
        assert!(normalize_path("nodes/../access").is_err());
        assert!(normalize_path("nodes/./pve").is_err());
        assert!(normalize_path("nodes?full=1").is_err());
    }

    #[test]
    fn test_form_pairs() {
        let params = json!({
            "onboot": true,
            "cores": 2,
            "name": "web",
            "delete": ["ide2", "net1"],
            "skip": null,
            "meta": {"a": 1}
        });
        let pairs = form_pairs(params.as_object().unwrap());

        assert!(pairs.contains(&("onboot".to_string(), "1".to_string())));
        assert!(pairs.contains(&("cores".to_string(), "2".to_string())));
        assert!(pairs.contains(&("name".to_string(), "web".to_string())));
        assert!(pairs.contains(&("delete".to_string(), "ide2".to_string())));
        assert!(pairs.contains(&("delete".to_string(), "net1".to_string())));
        assert!(pairs.contains(&("meta".to_string(), r#"{"a":1}"#.to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "skip"));
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("get".parse::<ApiMethod>().unwrap(), ApiMethod::Get);
        assert_eq!("Delete".parse::<ApiMethod>().unwrap(), ApiMethod::Delete);
        assert!("PATCH".parse::<ApiMethod>().is_err());
        assert!(ApiMethod::Put.has_body());
        assert!(!ApiMethod::Delete.has_body());
    }

    #[test]
    fn test_not_found_detection() {
        let missing = ProxmoxError::Api {
            status: 500,
            message: "Configuration file 'nodes/pve/qemu-server/999.conf' does not exist".to_string(),
        };
        assert!(missing.is_not_found());

        let other = ProxmoxError::Api {
            status: 500,
            message: "VM is locked (backup)".to_string(),
        };
        assert!(!other.is_not_found());
        assert!(!ProxmoxError::Transport("refused".to_string()).is_not_found());
    }

    #[test]
    fn test_error_hints() {
        let tls = ProxmoxError::Tls("invalid peer certificate: UnknownIssuer".to_string());
        assert!(tls.to_string().contains("verify_ssl=false"));

        let auth = ProxmoxError::Unauthorized {
            status: 401,
            message: "invalid token value".to_string(),
        };
        assert!(auth.to_string().contains("user@realm!token_name"));
    }

    #[tokio::test]
    async fn test_connectivity_check() {
        let api = fake::FakeApi::new();
        api.on_get("version", json!({"version": "8.2.4", "release": "8.2"}));
        assert_eq!(connectivity_check(&api).await.unwrap(), "8.2.4");
    }
}
