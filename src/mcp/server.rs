//! MCP Server implementation
//!
//! Exposes the Proxmox tool registry through the Model Context Protocol.

use super::types::*;
use super::McpError;
use crate::tools::{ToolError, ToolRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

const INSTRUCTIONS: &str = "Tools for managing a Proxmox VE cluster. Use them to:\n\
     - Inspect nodes, storage, cluster status and tasks\n\
     - List, create, start, stop, snapshot and delete VMs and LXC containers\n\
     - Run commands inside VMs through the QEMU guest agent\n\
     - Manage users, ACLs, pools, firewall, HA and backups\n\n\
     Long operations return a task id (UPID); poll it with get_task_status. \
     proxmox_request reaches any API path that has no dedicated tool.";

/// MCP Server for the Proxmox tools
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    /// Whether the client sent `notifications/initialized`
    initialized: bool,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run the MCP server over stdio until EOF or Ctrl-C
    pub async fn run_stdio(&mut self) -> Result<(), McpError> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();

        info!(tools = self.registry.definitions().len(), "MCP server starting on stdio");

        tokio::select! {
            result = self.serve(stdin, stdout) => result?,
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        }

        info!("MCP server shutting down");
        Ok(())
    }

    /// Serve newline-delimited JSON-RPC from `reader`, answering on `writer`
    pub async fn serve<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                // EOF
                break;
            }

            let message = line.trim();
            if message.is_empty() {
                continue;
            }

            debug!(request = %message, "Received MCP request");

            if let Some(response) = self.handle_message(message).await {
                let response_str = serde_json::to_string(&response)?;
                debug!(response = %response_str, "Sending MCP response");
                writer.write_all(response_str.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC message
    pub async fn handle_message(&mut self, message: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(message) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "Failed to parse JSON-RPC message");
                return Some(JsonRpcResponse::error(
                    JsonRpcId::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = value
                    .get("id")
                    .and_then(|id| serde_json::from_value(id.clone()).ok())
                    .unwrap_or(JsonRpcId::Null);
                warn!(error = %e, "Invalid JSON-RPC request");
                return Some(JsonRpcResponse::error(
                    id,
                    INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ));
            }
        };

        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return None;
        };

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(&request).await,
            "ping" => Ok(json!({})),
            method => {
                warn!(method = %method, "Unknown MCP method");
                Err((METHOD_NOT_FOUND, format!("Method not found: {}", method)))
            }
        };

        match result {
            Ok(value) => Some(JsonRpcResponse::success(id, value)),
            Err((code, message)) => Some(JsonRpcResponse::error(id, code, message)),
        }
    }

    fn handle_notification(&mut self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" | "initialized" => {
                self.initialized = true;
                info!("MCP client initialized");
            }
            method => debug!(method = %method, "Ignoring notification"),
        }
    }

    fn handle_initialize(&self) -> Result<Value, (i32, String)> {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        };

        serde_json::to_value(result).map_err(|e| (INTERNAL_ERROR, e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<Value, (i32, String)> {
        let result = ToolsListResult {
            tools: self.registry.definitions(),
        };
        serde_json::to_value(result).map_err(|e| (INTERNAL_ERROR, e.to_string()))
    }

    async fn handle_tools_call(&self, request: &JsonRpcRequest) -> Result<Value, (i32, String)> {
        let params: ToolCallParams = request
            .params
            .as_ref()
            .and_then(|p| serde_json::from_value(p.clone()).ok())
            .ok_or_else(|| (INVALID_PARAMS, "Missing or invalid params".to_string()))?;

        let result = match self.registry.call(&params.name, params.arguments).await {
            Ok(output) => ToolCallResult::text(output.text),
            Err(ToolError::UnknownTool(tool)) => {
                return Err((INVALID_PARAMS, format!("Unknown tool: {}", tool)));
            }
            Err(e) => ToolCallResult::error(e.to_string()),
        };

        serde_json::to_value(result).map_err(|e| (INTERNAL_ERROR, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxmox::fake::FakeApi;

    fn server() -> (Arc<FakeApi>, McpServer) {
        let api = Arc::new(FakeApi::new());
        let registry = Arc::new(ToolRegistry::new(api.clone()));
        (api, McpServer::new(registry))
    }

    #[tokio::test]
    async fn test_initialize() {
        let (_, mut server) = server();
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert!(result["capabilities"]["tools"].is_object());
        assert_eq!(result["serverInfo"]["name"], "proxmox-mcp");
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let (_, mut server) = server();
        assert!(server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());
        assert!(server.is_initialized());

        assert!(server
            .handle_message(r#"{"jsonrpc":"2.0","method":"tools/list"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_error_codes() {
        let (_, mut server) = server();

        let response = server.handle_message("{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);
        assert_eq!(response.id, JsonRpcId::Null);

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":"a","method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
        assert_eq!(response.id, JsonRpcId::String("a".into()));

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"tools/call"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);

        let response = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
            )
            .await
            .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert!(error.message.contains("nope"));

        let response = server.handle_message(r#"{"id":4,"method":5}"#).await.unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
        assert_eq!(response.id, JsonRpcId::Number(4));
    }

    #[tokio::test]
    async fn test_tool_failure_is_error_content() {
        let (_, mut server) = server();
        let response = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"get_node_status","arguments":{"node":"ghost"}}}"#,
            )
            .await
            .unwrap();

        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_serve_stream() {
        let (api, mut server) = server();
        api.on_get("nodes", json!([{"node": "pve", "status": "online"}]));

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"get_nodes"}}"#,
            "\n",
        );
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        let text = lines[1]["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("\"pve\""));
    }
}
