//! OpenAPI proxy
//!
//! Republishes every tool as `POST /{tool}` so that HTTP clients which do
//! not speak MCP (chat front-ends with OpenAPI tool servers, scripts) can
//! use the same registry. The generated document lives at `/openapi.json`
//! and a Swagger UI page at `/docs`.

mod auth;
mod docs;
mod server;
mod spec;

pub use auth::extract_api_key;
pub use server::{AppState, OpenApiServer};
pub use spec::build_document;

use thiserror::Error;

/// OpenAPI server errors
#[derive(Error, Debug)]
pub enum OpenApiError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}
