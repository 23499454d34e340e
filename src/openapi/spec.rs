//! OpenAPI 3.1 document generated from the tool registry

use crate::tools::ToolDefinition;
use serde_json::{json, Map, Value};

/// First sentence of a description, used as the operation summary
fn summary(description: &str) -> &str {
    description
        .split_once(". ")
        .map(|(first, _)| first)
        .unwrap_or(description)
        .trim_end_matches('.')
}

fn error_responses() -> Value {
    let error = json!({
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/Error" }
            }
        }
    });
    let with = |description: &str| {
        let mut response = error.clone();
        response["description"] = json!(description);
        response
    };

    json!({
        "400": with("Invalid arguments"),
        "401": with("Missing or invalid API key"),
        "404": with("Unknown tool or Proxmox object not found"),
        "409": with("Operation refused in the current state"),
        "502": with("Proxmox API or connection failure"),
    })
}

/// Build the document; `secured` adds the bearer scheme to every operation
pub fn build_document(tools: &[ToolDefinition], secured: bool) -> Value {
    let mut paths = Map::new();

    paths.insert(
        "/health".to_string(),
        json!({
            "get": {
                "operationId": "health",
                "summary": "Liveness check",
                "security": [],
                "responses": {
                    "200": {
                        "description": "Server is up",
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/Health" }
                            }
                        }
                    }
                }
            }
        }),
    );

    for tool in tools {
        let mut responses = error_responses();
        responses["200"] = json!({
            "description": "Tool result",
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/ToolResult" }
                }
            }
        });

        paths.insert(
            format!("/{}", tool.name),
            json!({
                "post": {
                    "operationId": tool.name,
                    "summary": summary(&tool.description),
                    "description": tool.description,
                    "requestBody": {
                        "required": false,
                        "content": {
                            "application/json": { "schema": tool.input_schema }
                        }
                    },
                    "responses": responses,
                }
            }),
        );
    }

    let mut document = json!({
        "openapi": "3.1.0",
        "info": {
            "title": "Proxmox MCP tools",
            "description": "Proxmox VE management tools. Each operation runs one tool; \
                            the request body holds the tool arguments.",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": paths,
        "components": {
            "schemas": {
                "ToolResult": {
                    "type": "object",
                    "properties": {
                        "tool": { "type": "string" },
                        "text": { "type": "string", "description": "Tool output as text" },
                        "result": { "description": "Tool output parsed as JSON, or null" },
                    },
                    "required": ["tool", "text", "result"],
                },
                "Error": {
                    "type": "object",
                    "properties": {
                        "error": { "type": "string" },
                        "code": { "type": "string" },
                    },
                    "required": ["error", "code"],
                },
                "Health": {
                    "type": "object",
                    "properties": {
                        "status": { "type": "string" },
                        "version": { "type": "string" },
                    },
                },
            }
        }
    });

    if secured {
        document["components"]["securitySchemes"] = json!({
            "bearerAuth": { "type": "http", "scheme": "bearer" }
        });
        document["security"] = json!([{ "bearerAuth": [] }]);
    }

    document
}
