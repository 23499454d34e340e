//! Raw configuration types for JSON parsing

use super::*;
use serde::Deserialize;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Raw configuration as parsed from JSON
#[derive(Debug, Deserialize, Default)]
pub struct RawConfig {
    pub proxmox: Option<RawProxmoxConfig>,
    pub auth: Option<RawAuthConfig>,
    pub logging: Option<RawLoggingConfig>,
}

impl RawConfig {
    /// Read and parse a JSON config file
    pub async fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse a JSON config document
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Override individual fields from discrete environment variables
    pub fn apply_env<F>(&mut self, env: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(env(key));

        let proxmox = self.proxmox.get_or_insert_with(Default::default);
        if let Some(host) = get(ENV_HOST) {
            proxmox.host = Some(host);
        }
        if let Some(port) = get(ENV_PORT) {
            let port = port.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} must be a port number, got '{}'", ENV_PORT, port))
            })?;
            proxmox.port = Some(port);
        }
        if let Some(service) = get(ENV_SERVICE) {
            proxmox.service = Some(service);
        }
        if let Some(verify) = get(ENV_VERIFY_SSL) {
            let verify = parse_bool(&verify).ok_or_else(|| {
                ConfigError::Invalid(format!("{} must be a boolean, got '{}'", ENV_VERIFY_SSL, verify))
            })?;
            proxmox.verify_ssl = Some(verify);
        }

        let auth = self.auth.get_or_insert_with(Default::default);
        if let Some(user) = get(ENV_USER) {
            auth.user = Some(user);
        }
        if let Some(token_name) = get(ENV_TOKEN_NAME) {
            auth.token_name = Some(token_name);
        }
        if let Some(token_value) = get(ENV_TOKEN_VALUE) {
            auth.token_value = Some(Secret::from(token_value));
        }

        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.logging.get_or_insert_with(Default::default).level = Some(level);
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawProxmoxConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub verify_ssl: Option<bool>,
    pub service: Option<String>,
    pub timeout: Option<u64>,
}

impl TryFrom<RawProxmoxConfig> for ProxmoxConfig {
    type Error = ConfigError;

    fn try_from(raw: RawProxmoxConfig) -> Result<Self, Self::Error> {
        let host = raw
            .host
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::Invalid("proxmox.host is required".to_string()))?;

        if host.contains("://") || host.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "proxmox.host must be a bare hostname or IP address, got '{}'",
                host
            )));
        }

        let service = match raw.service.as_deref() {
            Some(s) => s.parse()?,
            None => ProxmoxService::Pve,
        };

        let timeout = match raw.timeout {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "proxmox.timeout must be at least 1 second".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => Duration::from_secs(30),
        };

        Ok(Self {
            host,
            port: raw.port.unwrap_or_else(|| service.default_port()),
            verify_ssl: raw.verify_ssl.unwrap_or(true),
            service,
            timeout,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawAuthConfig {
    pub user: Option<String>,
    pub token_name: Option<String>,
    pub token_value: Option<Secret>,
}

impl TryFrom<RawAuthConfig> for AuthConfig {
    type Error = ConfigError;

    fn try_from(raw: RawAuthConfig) -> Result<Self, Self::Error> {
        let user = raw
            .user
            .map(|u| u.trim().to_string())
            .ok_or_else(|| ConfigError::Invalid("auth.user is required".to_string()))?;

        match user.split_once('@') {
            Some((name, realm)) if !name.is_empty() && !realm.is_empty() && !realm.contains('@') => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "auth.user must look like 'name@realm' (e.g. root@pam), got '{}'",
                    user
                )))
            }
        }

        let token_name = raw
            .token_name
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::Invalid("auth.token_name is required".to_string()))?;

        if token_name.contains(['!', '=']) || token_name.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "auth.token_name must be only the token id (without '{}!' or '=secret'), got '{}'",
                user, token_name
            )));
        }

        let token_value = raw
            .token_value
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::Invalid("auth.token_value is required".to_string()))?;

        Ok(Self {
            user,
            token_name,
            token_value,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
}

impl TryFrom<RawLoggingConfig> for LoggingConfig {
    type Error = ConfigError;

    fn try_from(raw: RawLoggingConfig) -> Result<Self, Self::Error> {
        let level = raw
            .level
            .map(|l| l.trim().to_ascii_lowercase())
            .map(|l| if l == "warning" { "warn".to_string() } else { l })
            .unwrap_or_else(|| "info".to_string());

        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Unknown log level: {} (expected one of {})",
                level,
                LOG_LEVELS.join(", ")
            )));
        }

        let format = match raw.format.as_deref().map(str::trim) {
            Some("json") => LogFormat::Json,
            Some("pretty") | Some("") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown log format: {} (expected pretty or json)",
                    other
                )))
            }
        };

        let file = raw.file.filter(|f| !f.trim().is_empty()).map(|p| {
            // Expand ~ to home directory
            if let Some(rest) = p.strip_prefix("~/") {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(rest)
            } else {
                PathBuf::from(p)
            }
        });

        Ok(Self {
            level,
            format,
            file,
        })
    }
}
