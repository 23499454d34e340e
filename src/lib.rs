//! proxmox-mcp - Proxmox VE tools for AI assistants
//!
//! Exposes the Proxmox VE REST API as Model Context Protocol tools over
//! stdio, republishes the same tools as an OpenAPI/REST surface, and ships
//! an infrastructure-as-code planner that diffs a YAML description of VMs
//! against the cluster.

pub mod config;
pub mod logging;
pub mod mcp;
pub mod openapi;
pub mod plan;
pub mod prompts;
pub mod proxmox;
pub mod tools;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Core error type for proxmox-mcp
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Proxmox API error: {0}")]
    Proxmox(#[from] proxmox::ProxmoxError),

    #[error("Tool error: {0}")]
    Tool(#[from] tools::ToolError),

    #[error("MCP server error: {0}")]
    Mcp(#[from] mcp::McpError),

    #[error("OpenAPI server error: {0}")]
    OpenApi(#[from] openapi::OpenApiError),

    #[error("Plan error: {0}")]
    Plan(#[from] plan::PlanError),

    #[error("Prompt template error: {0}")]
    Prompt(#[from] prompts::PromptError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A secret string that never shows up in `Debug` output or logs
#[derive(Debug, Clone)]
pub struct Secret(SecretString);

impl Secret {
    /// Create a new secret from a string
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Expose the secret value
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Whether the secret holds an empty string
    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("d6f1c1a0-0000-4000-8000-000000000000");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("d6f1c1a0"));
        assert_eq!(secret.expose(), "d6f1c1a0-0000-4000-8000-000000000000");
    }

    #[test]
    fn test_secret_deserialization() {
        let secret: Secret = serde_json::from_str("\"token-value\"").unwrap();
        assert_eq!(secret.expose(), "token-value");
        assert!(!secret.is_empty());
        assert!(Secret::from("").is_empty());
    }
}
