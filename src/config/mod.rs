//! Configuration system for proxmox-mcp
//!
//! Loads configuration from a JSON file and layers discrete environment
//! variables on top of it. Without a file the environment alone has to
//! provide the connection and token settings.

mod types;

pub use types::*;

use crate::Secret;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

/// Path of the JSON configuration file
pub const ENV_CONFIG: &str = "PROXMOX_MCP_CONFIG";
pub const ENV_HOST: &str = "PROXMOX_HOST";
pub const ENV_PORT: &str = "PROXMOX_PORT";
pub const ENV_USER: &str = "PROXMOX_USER";
pub const ENV_TOKEN_NAME: &str = "PROXMOX_TOKEN_NAME";
pub const ENV_TOKEN_VALUE: &str = "PROXMOX_TOKEN_VALUE";
pub const ENV_SERVICE: &str = "PROXMOX_SERVICE";
pub const ENV_VERIFY_SSL: &str = "PROXMOX_VERIFY_SSL";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

pub const ENV_SKIP_CONNECT_TEST: &str = "PROXMOX_MCP_SKIP_CONNECT_TEST";
pub const ENV_DISABLE_FILE_LOG: &str = "PROXMOX_MCP_DISABLE_FILE_LOG";
pub const ENV_LOG_FILE: &str = "PROXMOX_MCP_LOG_FILE";
pub const ENV_OPENAPI_PORT: &str = "OPENAPI_PORT";
pub const ENV_OPENAPI_HOST: &str = "OPENAPI_HOST";
pub const ENV_OPENAPI_API_KEY: &str = "OPENAPI_API_KEY";

/// Default port of the OpenAPI proxy
pub const DEFAULT_OPENAPI_PORT: u16 = 8811;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Invalid JSON in config file: {0}")]
    ParseError(String),

    #[error(
        "No configuration found. Either set {ENV_CONFIG} to a JSON config path, \
         or set {ENV_HOST}, {ENV_USER}, {ENV_TOKEN_NAME} and {ENV_TOKEN_VALUE} (missing: {0})"
    )]
    Missing(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main proxmox-mcp configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Proxmox connection settings
    pub proxmox: ProxmoxConfig,
    /// API token credentials
    pub auth: AuthConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file, without environment overrides
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = RawConfig::read(path.as_ref()).await?;
        Self::from_raw(raw, true)
    }

    /// Load configuration from a JSON string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Self::from_raw(RawConfig::parse(content)?, true)
    }

    /// Resolve configuration from the process environment
    ///
    /// An explicit path wins over `PROXMOX_MCP_CONFIG`, which wins over an
    /// existing file at [`Config::default_path`]. Environment variables then
    /// override individual fields of whatever the file provided.
    pub async fn resolve(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::default_path();
        let fallback = explicit_path
            .is_none()
            .then_some(default_path.as_path())
            .filter(|p| p.exists() && std::env::var_os(ENV_CONFIG).is_none());

        Self::resolve_with(explicit_path.or(fallback), |key| std::env::var(key).ok()).await
    }

    /// Resolve configuration using a custom environment lookup
    pub async fn resolve_with<F>(explicit_path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| non_empty(env(ENV_CONFIG)).map(PathBuf::from));

        let mut raw = match &path {
            Some(path) => RawConfig::read(path).await?,
            None => RawConfig::default(),
        };
        raw.apply_env(&env)?;

        Self::from_raw(raw, path.is_some())
    }

    /// Convert from raw JSON config to validated config
    fn from_raw(raw: RawConfig, from_file: bool) -> Result<Self, ConfigError> {
        let raw_proxmox = raw.proxmox.unwrap_or_default();
        let raw_auth = raw.auth.unwrap_or_default();

        if !from_file {
            let missing: Vec<&str> = [
                (ENV_HOST, raw_proxmox.host.is_none()),
                (ENV_USER, raw_auth.user.is_none()),
                (ENV_TOKEN_NAME, raw_auth.token_name.is_none()),
                (ENV_TOKEN_VALUE, raw_auth.token_value.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect();

            if !missing.is_empty() {
                return Err(ConfigError::Missing(missing.join(", ")));
            }
        }

        let proxmox = ProxmoxConfig::try_from(raw_proxmox)?;
        let auth = AuthConfig::try_from(raw_auth)?;
        let logging = LoggingConfig::try_from(raw.logging.unwrap_or_default())?;

        Ok(Self {
            proxmox,
            auth,
            logging,
        })
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proxmox-mcp")
            .join("config.json")
    }
}

/// Proxmox connection settings
#[derive(Debug, Clone)]
pub struct ProxmoxConfig {
    /// Hostname or IP address of the API endpoint
    pub host: String,
    /// API port
    pub port: u16,
    /// Whether to verify the server certificate
    pub verify_ssl: bool,
    /// Which Proxmox product the endpoint belongs to
    pub service: ProxmoxService,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Proxmox product behind the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxmoxService {
    /// Proxmox Virtual Environment
    Pve,
    /// Proxmox Mail Gateway
    Pmg,
    /// Proxmox Backup Server
    Pbs,
}

impl ProxmoxService {
    /// Default API port for the service
    pub fn default_port(&self) -> u16 {
        match self {
            ProxmoxService::Pbs => 8007,
            ProxmoxService::Pve | ProxmoxService::Pmg => 8006,
        }
    }

    /// Build the `Authorization` header value for an API token
    pub fn token_header(&self, user: &str, token_name: &str, token_value: &str) -> String {
        match self {
            ProxmoxService::Pve => format!("PVEAPIToken={}!{}={}", user, token_name, token_value),
            ProxmoxService::Pmg => format!("PMGAPIToken={}!{}={}", user, token_name, token_value),
            ProxmoxService::Pbs => format!("PBSAPIToken={}!{}:{}", user, token_name, token_value),
        }
    }
}

impl std::str::FromStr for ProxmoxService {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PVE" => Ok(ProxmoxService::Pve),
            "PMG" => Ok(ProxmoxService::Pmg),
            "PBS" => Ok(ProxmoxService::Pbs),
            other => Err(ConfigError::Invalid(format!(
                "Unknown Proxmox service: {} (expected PVE, PMG or PBS)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ProxmoxService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxmoxService::Pve => write!(f, "PVE"),
            ProxmoxService::Pmg => write!(f, "PMG"),
            ProxmoxService::Pbs => write!(f, "PBS"),
        }
    }
}

/// API token credentials
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// User including realm, e.g. `root@pam`
    pub user: String,
    /// Token id without the user prefix
    pub token_name: String,
    /// Token secret
    pub token_value: Secret,
}

impl AuthConfig {
    /// Full token id as shown in the Proxmox UI (`user@realm!token`)
    pub fn token_id(&self) -> String {
        format!("{}!{}", self.user, self.token_name)
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Optional log file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format
    Pretty,
    /// JSON format
    Json,
}

/// Operational flags read from the environment
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Skip the startup connectivity probe
    pub skip_connect_test: bool,
    /// Never write a log file
    pub disable_file_log: bool,
    /// Log file override
    pub log_file: Option<PathBuf>,
    /// Bind host of the OpenAPI proxy
    pub openapi_host: String,
    /// Bind port of the OpenAPI proxy
    pub openapi_port: u16,
    /// Bearer key required by the OpenAPI proxy
    pub openapi_api_key: Option<Secret>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            skip_connect_test: false,
            disable_file_log: false,
            log_file: None,
            openapi_host: "127.0.0.1".to_string(),
            openapi_port: DEFAULT_OPENAPI_PORT,
            openapi_api_key: None,
        }
    }
}

impl RuntimeOptions {
    /// Read runtime options from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read runtime options using a custom environment lookup
    pub fn from_lookup<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let openapi_port = match non_empty(env(ENV_OPENAPI_PORT)) {
            Some(port) => port.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} must be a port number, got '{}'", ENV_OPENAPI_PORT, port))
            })?,
            None => defaults.openapi_port,
        };

        Ok(Self {
            skip_connect_test: flag(&env, ENV_SKIP_CONNECT_TEST),
            disable_file_log: flag(&env, ENV_DISABLE_FILE_LOG),
            log_file: non_empty(env(ENV_LOG_FILE)).map(PathBuf::from),
            openapi_host: non_empty(env(ENV_OPENAPI_HOST)).unwrap_or(defaults.openapi_host),
            openapi_port,
            openapi_api_key: non_empty(env(ENV_OPENAPI_API_KEY)).map(Secret::from),
        })
    }

    /// Socket address for the OpenAPI proxy
    pub fn openapi_bind(&self) -> String {
        if self.openapi_host.contains(':') && !self.openapi_host.starts_with('[') {
            format!("[{}]:{}", self.openapi_host, self.openapi_port)
        } else {
            format!("{}:{}", self.openapi_host, self.openapi_port)
        }
    }
}

/// Parse a boolean environment value
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn flag<F>(env: &F, key: &str) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    env(key).and_then(|v| parse_bool(&v)).unwrap_or(false)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_service_token_header() {
        assert_eq!(
            ProxmoxService::Pve.token_header("root@pam", "mcp", "abc"),
            "PVEAPIToken=root@pam!mcp=abc"
        );
        assert_eq!(
            ProxmoxService::Pbs.token_header("backup@pbs", "mcp", "abc"),
            "PBSAPIToken=backup@pbs!mcp:abc"
        );
    }

    #[test]
    fn test_service_parse() {
        assert_eq!("pve".parse::<ProxmoxService>().unwrap(), ProxmoxService::Pve);
        assert_eq!(" PBS ".parse::<ProxmoxService>().unwrap(), ProxmoxService::Pbs);
        assert!("vmware".parse::<ProxmoxService>().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[tokio::test]
    async fn test_resolve_from_env_only() {
        let env = lookup(&[
            (ENV_HOST, "pve.lab"),
            (ENV_USER, "root@pam"),
            (ENV_TOKEN_NAME, "mcp"),
            (ENV_TOKEN_VALUE, "secret"),
            (ENV_PORT, "8443"),
            (ENV_VERIFY_SSL, "false"),
        ]);

        let config = Config::resolve_with(None, env).await.unwrap();
        assert_eq!(config.proxmox.host, "pve.lab");
        assert_eq!(config.proxmox.port, 8443);
        assert!(!config.proxmox.verify_ssl);
        assert_eq!(config.proxmox.service, ProxmoxService::Pve);
        assert_eq!(config.auth.token_id(), "root@pam!mcp");
    }

    #[tokio::test]
    async fn test_resolve_without_anything_names_both_options() {
        let env = lookup(&[(ENV_HOST, "pve.lab")]);
        let err = Config::resolve_with(None, env).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains(ENV_CONFIG));
        assert!(message.contains(ENV_TOKEN_VALUE));
        assert!(!message.contains("missing: PROXMOX_HOST"));
    }

    #[tokio::test]
    async fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "proxmox": {"host": "file-host", "port": 8006, "verify_ssl": true},
                "auth": {"user": "root@pam", "token_name": "file", "token_value": "file-secret"}
            }"#,
        )
        .unwrap();

        let env = lookup(&[(ENV_HOST, "env-host"), (ENV_TOKEN_NAME, "env-token")]);
        let config = Config::resolve_with(Some(&path), env).await.unwrap();
        assert_eq!(config.proxmox.host, "env-host");
        assert_eq!(config.auth.token_name, "env-token");
        assert_eq!(config.auth.token_value.expose(), "file-secret");
        assert!(config.proxmox.verify_ssl);
    }

    #[tokio::test]
    async fn test_config_path_from_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pmcp.json");
        std::fs::write(
            &path,
            r#"{"proxmox": {"host": "h"}, "auth": {"user": "u@pve", "token_name": "t", "token_value": "v"}}"#,
        )
        .unwrap();

        let path_str = path.to_string_lossy().to_string();
        let env = lookup(&[(ENV_CONFIG, path_str.as_str())]);
        let config = Config::resolve_with(None, env).await.unwrap();
        assert_eq!(config.proxmox.host, "h");
        assert_eq!(config.proxmox.port, 8006);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = Config::load("/nonexistent/proxmox-mcp.json").await.unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_invalid_port_env() {
        let err = RawConfig::default()
            .apply_env(&lookup(&[(ENV_PORT, "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_PORT));
    }

    #[test]
    fn test_runtime_options() {
        let options = RuntimeOptions::from_lookup(lookup(&[
            (ENV_SKIP_CONNECT_TEST, "1"),
            (ENV_DISABLE_FILE_LOG, "yes"),
            (ENV_LOG_FILE, "/tmp/pmcp.log"),
            (ENV_OPENAPI_PORT, "9000"),
            (ENV_OPENAPI_API_KEY, "k"),
        ]))
        .unwrap();

        assert!(options.skip_connect_test);
        assert!(options.disable_file_log);
        assert_eq!(options.log_file, Some(PathBuf::from("/tmp/pmcp.log")));
        assert_eq!(options.openapi_bind(), "127.0.0.1:9000");
        assert_eq!(options.openapi_api_key.unwrap().expose(), "k");

        let defaults = RuntimeOptions::from_lookup(lookup(&[])).unwrap();
        assert!(!defaults.skip_connect_test);
        assert_eq!(defaults.openapi_port, DEFAULT_OPENAPI_PORT);
    }

    #[test]
    fn test_runtime_options_ipv6_host() {
        let options =
            RuntimeOptions::from_lookup(lookup(&[(ENV_OPENAPI_HOST, "::1")])).unwrap();
        assert_eq!(options.openapi_bind(), "[::1]:8811");
    }
}
