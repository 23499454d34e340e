//! OpenAPI proxy server implementation using Axum

use super::auth::require_api_key;
use super::docs::DocsTemplate;
use super::spec::build_document;
use super::OpenApiError;
use crate::tools::{ToolError, ToolOutput, ToolRegistry};
use crate::Secret;
use askama::Template;
use axum::{
    body::Bytes,
    extract::{FromRef, Path, Request, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    pub api_key: Option<Arc<Secret>>,
    pub document: Arc<Value>,
}

impl FromRef<AppState> for Arc<ToolRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

/// Successful tool call
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub tool: String,
    pub text: String,
    pub result: Value,
}

impl ToolResponse {
    fn new(tool: String, output: ToolOutput) -> Self {
        let result = output
            .data
            .or_else(|| serde_json::from_str(&output.text).ok())
            .unwrap_or(Value::Null);
        Self {
            tool,
            text: output.text,
            result,
        }
    }
}

pub(super) fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ApiError {
            error: message.to_string(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

/// HTTP status and error code for a failed tool call
fn classify(error: &ToolError) -> (StatusCode, &'static str) {
    match error {
        ToolError::UnknownTool(_) => (StatusCode::NOT_FOUND, "unknown_tool"),
        ToolError::InvalidArguments(_) => (StatusCode::BAD_REQUEST, "invalid_arguments"),
        ToolError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ToolError::Precondition(_) => (StatusCode::CONFLICT, "precondition_failed"),
        ToolError::Api { .. } => (StatusCode::BAD_GATEWAY, "upstream_error"),
        ToolError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

/// HTTP server publishing the tool registry as REST operations
pub struct OpenApiServer {
    state: AppState,
}

impl OpenApiServer {
    /// Create a server; requests need `api_key` as bearer token when set
    pub fn new(registry: Arc<ToolRegistry>, api_key: Option<Secret>) -> Self {
        let api_key = api_key.filter(|k| !k.is_empty()).map(Arc::new);
        let document = build_document(registry.definitions(), api_key.is_some());

        Self {
            state: AppState {
                registry,
                api_key,
                document: Arc::new(document),
            },
        }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let protected = Router::new()
            .route("/openapi.json", get(openapi_json))
            .route("/docs", get(docs))
            .route("/{tool}", post(call_tool))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                require_api_key,
            ));

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(health))
            .merge(protected)
            .layer(cors)
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                info_span!(
                    "http",
                    request_id = %Uuid::new_v4(),
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }))
            .with_state(self.state.clone())
    }

    /// Bind `addr` and serve until Ctrl-C
    pub async fn run(self, addr: &str) -> Result<(), OpenApiError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| OpenApiError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        info!(
            bind = %addr,
            tools = self.state.registry.definitions().len(),
            auth = self.state.api_key.is_some(),
            "Starting OpenAPI proxy"
        );

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), OpenApiError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("OpenAPI proxy stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn openapi_json(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.document.as_ref().clone())
}

async fn docs(State(registry): State<Arc<ToolRegistry>>) -> impl IntoResponse {
    let template = DocsTemplate::new(registry.definitions());
    Html(template.render().unwrap_or_else(|e| format!("Template error: {}", e)))
}

async fn call_tool(
    State(registry): State<Arc<ToolRegistry>>,
    Path(tool): Path<String>,
    body: Bytes,
) -> Response {
    if !registry.contains(&tool) {
        return error_response(
            StatusCode::NOT_FOUND,
            "unknown_tool",
            &format!("Unknown tool: {}", tool),
        );
    }

    let arguments = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => value,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid_arguments",
                    &format!("Request body is not valid JSON: {}", e),
                )
            }
        }
    };

    match registry.call(&tool, arguments).await {
        Ok(output) => Json(ToolResponse::new(tool, output)).into_response(),
        Err(e) => {
            let (status, code) = classify(&e);
            warn!(tool = %tool, status = status.as_u16(), error = %e, "Tool call failed");
            error_response(status, code, &e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxmox::ProxmoxError;

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&ToolError::UnknownTool("x".into())),
            (StatusCode::NOT_FOUND, "unknown_tool")
        );
        assert_eq!(
            classify(&ToolError::InvalidArguments("x".into())).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            classify(&ToolError::Precondition("running".into())),
            (StatusCode::CONFLICT, "precondition_failed")
        );
        let upstream = ToolError::Api {
            action: "list nodes".into(),
            source: ProxmoxError::Transport("connection refused".into()),
        };
        assert_eq!(classify(&upstream), (StatusCode::BAD_GATEWAY, "upstream_error"));
    }

    #[test]
    fn test_tool_response_result() {
        let response = ToolResponse::new("get_nodes".into(), ToolOutput::json(json!([{"node": "pve"}])));
        assert_eq!(response.result[0]["node"], "pve");

        let response = ToolResponse::new("x".into(), ToolOutput::text("Node pve\n  Status: online"));
        assert_eq!(response.result, Value::Null);

        let response = ToolResponse::new("x".into(), ToolOutput::text("{\"ok\":true}"));
        assert_eq!(response.result["ok"], true);
    }
}
