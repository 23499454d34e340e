//! Configuration resolution through to a constructed client
//!
//! Tests the full flow: JSON file + environment -> Config -> ProxmoxClient

use proxmox_mcp::config::{
    Config, ConfigError, LogFormat, ProxmoxService, RuntimeOptions, ENV_CONFIG, ENV_HOST,
    ENV_LOG_LEVEL, ENV_SERVICE, ENV_TOKEN_NAME, ENV_TOKEN_VALUE, ENV_USER, ENV_VERIFY_SSL,
};
use proxmox_mcp::proxmox::ProxmoxClient;
use std::collections::HashMap;
use tempfile::tempdir;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

const FILE: &str = r#"{
    "proxmox": {"host": "pve.lab", "port": 8006, "verify_ssl": true, "service": "pve", "timeout": 10},
    "auth": {"user": "mcp@pve", "token_name": "assistant", "token_value": "00000000-1111-2222-3333-444444444444"},
    "logging": {"level": "WARNING", "format": "json", "file": "proxmox_mcp.log"}
}"#;

#[tokio::test]
async fn test_file_with_env_overrides_builds_client() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, FILE).await.unwrap();

    let path_str = path.to_string_lossy().to_string();
    let config = Config::resolve_with(
        None,
        env(&[
            (ENV_CONFIG, path_str.as_str()),
            (ENV_HOST, "10.0.0.5"),
            (ENV_VERIFY_SSL, "off"),
            (ENV_LOG_LEVEL, "debug"),
        ]),
    )
    .await
    .unwrap();

    assert_eq!(config.proxmox.host, "10.0.0.5");
    assert!(!config.proxmox.verify_ssl);
    assert_eq!(config.proxmox.timeout.as_secs(), 10);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.auth.token_id(), "mcp@pve!assistant");

    let debug = format!("{:?}", config);
    assert!(!debug.contains("00000000-1111"));

    let client = ProxmoxClient::new(&config.proxmox, &config.auth).unwrap();
    assert_eq!(client.base_url().as_str(), "https://10.0.0.5:8006/api2/json/");
    assert_eq!(
        client.url("/nodes/pve/qemu").unwrap().as_str(),
        "https://10.0.0.5:8006/api2/json/nodes/pve/qemu"
    );
}

#[tokio::test]
async fn test_env_only_pbs_defaults() {
    let config = Config::resolve_with(
        None,
        env(&[
            (ENV_HOST, "fe80::1"),
            (ENV_USER, "backup@pbs"),
            (ENV_TOKEN_NAME, "mcp"),
            (ENV_TOKEN_VALUE, "secret"),
            (ENV_SERVICE, "PBS"),
        ]),
    )
    .await
    .unwrap();

    assert_eq!(config.proxmox.service, ProxmoxService::Pbs);
    assert_eq!(config.proxmox.port, 8007);
    assert!(config.proxmox.verify_ssl);

    let client = ProxmoxClient::new(&config.proxmox, &config.auth).unwrap();
    assert_eq!(client.base_url().as_str(), "https://[fe80::1]:8007/api2/json/");
}

#[tokio::test]
async fn test_malformed_token_name_rejected() {
    let err = Config::resolve_with(
        None,
        env(&[
            (ENV_HOST, "pve.lab"),
            (ENV_USER, "root@pam"),
            (ENV_TOKEN_NAME, "root@pam!mcp"),
            (ENV_TOKEN_VALUE, "secret"),
        ]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.to_string().contains("token_name"));
}

#[tokio::test]
async fn test_invalid_json_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let err = Config::resolve_with(Some(&path), env(&[])).await.unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn test_runtime_options_bad_port() {
    let err = RuntimeOptions::from_lookup(env(&[("OPENAPI_PORT", "http")])).unwrap_err();
    assert!(err.to_string().contains("OPENAPI_PORT"));
}
