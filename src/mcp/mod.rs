//! Model Context Protocol (MCP) interface for LLM integration
//!
//! Publishes the Proxmox tool registry as MCP tools. The server speaks
//! newline-delimited JSON-RPC 2.0 over stdio; stdout carries nothing but
//! protocol frames, so all logging goes to stderr or a file.

mod server;
mod types;

pub use server::McpServer;
pub use types::*;

use thiserror::Error;

/// MCP transport errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
