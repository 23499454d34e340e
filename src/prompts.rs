//! Natural-language prompt templates
//!
//! An integration YAML file maps tool names to prompt templates with
//! `{placeholder}` fields. Fragments are optional snippets that are only
//! spliced in when every value they reference was supplied.

use crate::Secret;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default location of the integration file
pub const DEFAULT_TEMPLATE_PATH: &str = "config/mcp_integration.yaml";

const DEFAULT_BASE_URL: &str = "http://localhost:8811";

/// Prompt template errors
#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid template YAML: {0}")]
    Parse(String),

    #[error("Invalid parameter '{0}', expected key=value")]
    InvalidAssignment(String),
}

/// Loaded integration file
#[derive(Debug, Clone)]
pub struct TemplateConfig {
    pub base_url: String,
    pub mode: String,
    pub auth_type: String,
    pub api_key: Option<Secret>,
    pub templates: BTreeMap<String, String>,
    pub fragments: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawTemplateFile {
    #[serde(default)]
    mcp_server: RawServer,
    #[serde(default)]
    command_templates: BTreeMap<String, String>,
    #[serde(default)]
    fragments: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawServer {
    base_url: Option<String>,
    mode: Option<String>,
    #[serde(default)]
    authentication: RawAuthentication,
}

#[derive(Debug, Deserialize, Default)]
struct RawAuthentication {
    #[serde(rename = "type")]
    kind: Option<String>,
    api_key: Option<Secret>,
}

impl TemplateConfig {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PromptError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PromptError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PromptError> {
        let raw: Option<RawTemplateFile> =
            serde_yaml::from_str(content).map_err(|e| PromptError::Parse(e.to_string()))?;
        let raw = raw.unwrap_or_default();

        Ok(Self {
            base_url: raw
                .mcp_server
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            mode: raw.mcp_server.mode.unwrap_or_else(|| "openapi".to_string()),
            auth_type: raw
                .mcp_server
                .authentication
                .kind
                .unwrap_or_else(|| "none".to_string()),
            api_key: raw.mcp_server.authentication.api_key,
            templates: raw.command_templates,
            fragments: raw.fragments,
        })
    }

    /// Render the prompt for `tool`
    ///
    /// Unknown tools get a generic description listing the parameters.
    pub fn render(&self, tool: &str, params: &BTreeMap<String, String>) -> String {
        let Some(template) = self.templates.get(tool).filter(|t| !t.is_empty()) else {
            return format!("Execute {} with parameters: {}", tool, params_json(params));
        };

        let mut values = params.clone();
        for (name, fragment) in &self.fragments {
            let complete = placeholders(fragment)
                .iter()
                .all(|key| params.get(key).is_some_and(|v| !v.is_empty()));
            let filled = if complete {
                fill(fragment, params).unwrap_or_else(|_| fragment.clone())
            } else {
                String::new()
            };
            values.insert(name.clone(), filled);
        }

        match fill(template, &values) {
            Ok(prompt) => prompt,
            Err(_) => format!("{} | Params: {}", template, params_json(&values)),
        }
    }
}

/// Parse a `key=value` command-line assignment
pub fn parse_assignment(input: &str) -> Result<(String, String), PromptError> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(PromptError::InvalidAssignment(input.to_string())),
    }
}

fn params_json(params: &BTreeMap<String, String>) -> Value {
    Value::Object(
        params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<Map<String, Value>>(),
    )
}

enum Piece<'a> {
    Literal(&'a str),
    Field(&'a str),
}

/// Split a template into literals and `{field}` references
///
/// `{{` and `}}` are literal braces.
fn pieces(template: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        let (literal, tail) = rest.split_at(pos);
        if !literal.is_empty() {
            out.push(Piece::Literal(literal));
        }

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push(Piece::Literal(&tail[..1]));
            rest = &tail[2..];
        } else if tail.starts_with('{') {
            match tail.find('}') {
                Some(end) => {
                    out.push(Piece::Field(&tail[1..end]));
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push(Piece::Literal(tail));
                    rest = "";
                }
            }
        } else {
            out.push(Piece::Literal(&tail[..1]));
            rest = &tail[1..];
        }
    }

    if !rest.is_empty() {
        out.push(Piece::Literal(rest));
    }
    out
}

/// Field names referenced by a template
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for piece in pieces(template) {
        if let Piece::Field(name) = piece {
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Substitute every field; the error names the first missing one
fn fill(template: &str, values: &BTreeMap<String, String>) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    for piece in pieces(template) {
        match piece {
            Piece::Literal(text) => out.push_str(text),
            Piece::Field(name) => match values.get(name) {
                Some(value) => out.push_str(value),
                None => return Err(name.to_string()),
            },
        }
    }
    Ok(out)
}
