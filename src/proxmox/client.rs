//! reqwest-backed Proxmox API client

use super::{form_pairs, normalize_path, ApiMethod, Params, ProxmoxApi, ProxmoxError};
use crate::config::{AuthConfig, ProxmoxConfig};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use std::error::Error as StdError;
use tracing::{debug, warn};

const MAX_ERROR_BODY: usize = 500;

/// HTTPS client for one Proxmox endpoint
pub struct ProxmoxClient {
    client: Client,
    base_url: Url,
}

impl ProxmoxClient {
    /// Create a client for the configured endpoint
    pub fn new(proxmox: &ProxmoxConfig, auth: &AuthConfig) -> Result<Self, ProxmoxError> {
        let host = if proxmox.host.contains(':') && !proxmox.host.starts_with('[') {
            format!("[{}]", proxmox.host)
        } else {
            proxmox.host.clone()
        };
        let base_url = Url::parse(&format!("https://{}:{}/api2/json/", host, proxmox.port))
            .map_err(|e| ProxmoxError::InvalidPath(format!("{}: {}", proxmox.host, e)))?;

        Self::with_base_url(base_url, proxmox, auth)
    }

    /// Create a client against an explicit base URL
    pub fn with_base_url(
        base_url: Url,
        proxmox: &ProxmoxConfig,
        auth: &AuthConfig,
    ) -> Result<Self, ProxmoxError> {
        let token = proxmox.service.token_header(
            &auth.user,
            &auth.token_name,
            auth.token_value.expose(),
        );
        let mut value = HeaderValue::from_str(&token).map_err(|_| {
            ProxmoxError::InvalidCredentials(
                "token contains characters that are not allowed in an HTTP header".to_string(),
            )
        })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);

        if !proxmox.verify_ssl {
            warn!(host = %proxmox.host, "TLS certificate verification is disabled");
        }

        let client = Client::builder()
            .user_agent(concat!("proxmox-mcp/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .danger_accept_invalid_certs(!proxmox.verify_ssl)
            .timeout(proxmox.timeout)
            .build()
            .map_err(|e| ProxmoxError::Transport(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Base URL all paths are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an API path to a full URL
    pub fn url(&self, path: &str) -> Result<Url, ProxmoxError> {
        let segments = normalize_path(path)?;
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProxmoxError::InvalidPath(path.to_string()))?
            .pop_if_empty()
            .extend(&segments);
        Ok(url)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, ProxmoxError> {
        let response = builder.send().await.map_err(classify_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(ProxmoxError::Unauthorized {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        if !status.is_success() {
            return Err(ProxmoxError::Api {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        unwrap_envelope(&body)
    }
}

#[async_trait]
impl ProxmoxApi for ProxmoxClient {
    async fn request(
        &self,
        method: ApiMethod,
        path: &str,
        params: Params,
    ) -> Result<Value, ProxmoxError> {
        let url = self.url(path)?;
        let pairs = form_pairs(&params);
        debug!(method = %method, path = %url.path(), params = pairs.len(), "Proxmox API request");

        let builder = match method {
            ApiMethod::Get => self.client.get(url).query(&pairs),
            ApiMethod::Delete => self.client.delete(url).query(&pairs),
            ApiMethod::Post => self.client.post(url).form(&pairs),
            ApiMethod::Put => self.client.put(url).form(&pairs),
        };

        self.send(builder).await
    }

    async fn upload(
        &self,
        path: &str,
        fields: Params,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<Value, ProxmoxError> {
        let url = self.url(path)?;
        debug!(path = %url.path(), file = %file_name, bytes = content.len(), "Proxmox API upload");

        let mut form = Form::new();
        for (key, value) in form_pairs(&fields) {
            form = form.text(key, value);
        }
        form = form.part(
            "filename",
            Part::bytes(content).file_name(file_name.to_string()),
        );

        self.send(self.client.post(url).multipart(form)).await
    }
}

/// Take the `data` member out of a Proxmox response body
fn unwrap_envelope(body: &str) -> Result<Value, ProxmoxError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    let mut value: Value =
        serde_json::from_str(body).map_err(|e| ProxmoxError::Decode(e.to_string()))?;

    match value.as_object_mut().and_then(|obj| obj.remove("data")) {
        Some(data) => Ok(data),
        None => Ok(value),
    }
}

/// Build a readable message from an error response
fn error_message(status: StatusCode, body: &str) -> String {
    let mut parts = Vec::new();

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            parts.push(message.trim().to_string());
        }
        if let Some(errors) = value.get("errors").and_then(Value::as_object) {
            let details: Vec<String> = errors
                .iter()
                .map(|(field, reason)| match reason.as_str() {
                    Some(reason) => format!("{}: {}", field, reason.trim()),
                    None => format!("{}: {}", field, reason),
                })
                .collect();
            if !details.is_empty() {
                parts.push(details.join("; "));
            }
        }
    } else if !body.trim().is_empty() {
        let mut text: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
        if body.trim().chars().count() > MAX_ERROR_BODY {
            text.push_str("...");
        }
        parts.push(text);
    }

    if parts.is_empty() {
        parts.push(
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        );
    }

    parts.join(" - ")
}

/// Map a reqwest failure, pulling TLS problems out of the source chain
fn classify_transport(err: reqwest::Error) -> ProxmoxError {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        chain.push(inner.to_string());
        source = inner.source();
    }
    let detail = chain.join(": ");
    let lower = detail.to_ascii_lowercase();

    if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") {
        ProxmoxError::Tls(detail)
    } else if err.is_timeout() {
        ProxmoxError::Transport(format!("request timed out: {}", detail))
    } else {
        ProxmoxError::Transport(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxmoxService;
    use crate::Secret;
    use axum::extract::{Form as AxumForm, Query};
    use axum::http::HeaderMap as AxumHeaders;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    fn proxmox_config(service: ProxmoxService) -> ProxmoxConfig {
        ProxmoxConfig {
            host: "pve.example".to_string(),
            port: 8006,
            verify_ssl: false,
            service,
            timeout: Duration::from_secs(5),
        }
    }

    fn auth_config() -> AuthConfig {
        AuthConfig {
            user: "root@pam".to_string(),
            token_name: "mcp".to_string(),
            token_value: Secret::new("s3cret"),
        }
    }

    async fn spawn(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{}/api2/json/", addr)).unwrap()
    }

    #[test]
    fn test_url_building() {
        let client = ProxmoxClient::new(&proxmox_config(ProxmoxService::Pve), &auth_config()).unwrap();
        assert_eq!(client.base_url().as_str(), "https://pve.example:8006/api2/json/");
        assert_eq!(
            client.url("/nodes/pve/qemu/100/status/current").unwrap().as_str(),
            "https://pve.example:8006/api2/json/nodes/pve/qemu/100/status/current"
        );
        assert_eq!(
            client.url("api2/json/storage/local").unwrap().as_str(),
            "https://pve.example:8006/api2/json/storage/local"
        );
        assert_eq!(
            client.url("nodes/pve/storage/local/content/local:iso/a b.iso").unwrap().path(),
            "/api2/json/nodes/pve/storage/local/content/local:iso/a%20b.iso"
        );
        assert!(client.url("../etc").is_err());
    }

    #[test]
    fn test_ipv6_host() {
        let mut config = proxmox_config(ProxmoxService::Pve);
        config.host = "fd00::10".to_string();
        let client = ProxmoxClient::new(&config, &auth_config()).unwrap();
        assert_eq!(client.base_url().as_str(), "https://[fd00::10]:8006/api2/json/");
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"data":null,"errors":{"vmid":"invalid format - value does not look like a valid VM ID"}}"#;
        let message = error_message(StatusCode::BAD_REQUEST, body);
        assert!(message.contains("vmid: invalid format"));

        assert_eq!(error_message(StatusCode::NOT_IMPLEMENTED, ""), "Not Implemented");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
    }

    #[test]
    fn test_unwrap_envelope() {
        assert_eq!(unwrap_envelope(r#"{"data":[1,2]}"#).unwrap(), json!([1, 2]));
        assert_eq!(unwrap_envelope(r#"{"data":null}"#).unwrap(), Value::Null);
        assert_eq!(unwrap_envelope("").unwrap(), Value::Null);
        assert!(unwrap_envelope("<html>").is_err());
    }

    #[tokio::test]
    async fn test_get_sends_token_and_query() {
        let router = Router::new().route(
            "/api2/json/cluster/resources",
            get(|headers: AxumHeaders, Query(query): Query<HashMap<String, String>>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({"data": {"auth": auth, "type": query.get("type")}}))
            }),
        );
        let base = spawn(router).await;
        let client =
            ProxmoxClient::with_base_url(base, &proxmox_config(ProxmoxService::Pve), &auth_config())
                .unwrap();

        let mut params = Params::new();
        params.insert("type".to_string(), json!("vm"));
        let data = client.get_with("/cluster/resources", params).await.unwrap();

        assert_eq!(data["auth"], "PVEAPIToken=root@pam!mcp=s3cret");
        assert_eq!(data["type"], "vm");
    }

    #[tokio::test]
    async fn test_post_is_form_encoded() {
        let router = Router::new().route(
            "/api2/json/nodes/pve/qemu",
            post(|AxumForm(form): AxumForm<Vec<(String, String)>>| async move {
                Json(json!({"data": form}))
            }),
        );
        let base = spawn(router).await;
        let client =
            ProxmoxClient::with_base_url(base, &proxmox_config(ProxmoxService::Pve), &auth_config())
                .unwrap();

        let params = json!({"vmid": 120, "agent": true, "name": "web-1"});
        let data = client
            .post("nodes/pve/qemu", params.as_object().cloned().unwrap())
            .await
            .unwrap();

        let pairs: Vec<(String, String)> = serde_json::from_value(data).unwrap();
        assert!(pairs.contains(&("vmid".to_string(), "120".to_string())));
        assert!(pairs.contains(&("agent".to_string(), "1".to_string())));
        assert!(pairs.contains(&("name".to_string(), "web-1".to_string())));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let router = Router::new()
            .route(
                "/api2/json/version",
                get(|| async { (axum::http::StatusCode::UNAUTHORIZED, "") }),
            )
            .route(
                "/api2/json/nodes/pve/qemu/999/status/current",
                get(|| async {
                    (
                        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"data": null, "message": "Configuration file 'nodes/pve/qemu-server/999.conf' does not exist\n"})),
                    )
                }),
            );
        let base = spawn(router).await;
        let client =
            ProxmoxClient::with_base_url(base, &proxmox_config(ProxmoxService::Pve), &auth_config())
                .unwrap();

        let err = client.get("version").await.unwrap_err();
        assert!(matches!(err, ProxmoxError::Unauthorized { status: 401, .. }));

        let err = client.get("nodes/pve/qemu/999/status/current").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = Url::parse(&format!("http://{}/api2/json/", addr)).unwrap();
        let client =
            ProxmoxClient::with_base_url(base, &proxmox_config(ProxmoxService::Pbs), &auth_config())
                .unwrap();

        let err = client.get("version").await.unwrap_err();
        assert!(matches!(err, ProxmoxError::Transport(_)));
    }
}
