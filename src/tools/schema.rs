//! JSON schema helpers for tool definitions

use super::ToolDefinition;
use serde_json::{json, Map, Value};

pub fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Object schema from `(name, schema)` pairs
pub fn object(properties: Vec<(&str, Value)>, required: &[&str]) -> Value {
    let properties: Map<String, Value> = properties
        .into_iter()
        .map(|(name, schema)| (name.to_string(), schema))
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub fn empty() -> Value {
    object(vec![], &[])
}

pub fn string(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

pub fn integer(description: &str) -> Value {
    json!({ "type": "integer", "description": description })
}

pub fn ranged(description: &str, minimum: u64, maximum: u64) -> Value {
    json!({
        "type": "integer",
        "description": description,
        "minimum": minimum,
        "maximum": maximum,
    })
}

pub fn boolean(description: &str, default: Option<bool>) -> Value {
    match default {
        Some(default) => json!({ "type": "boolean", "description": description, "default": default }),
        None => json!({ "type": "boolean", "description": description }),
    }
}

pub fn dict(description: &str) -> Value {
    json!({ "type": "object", "description": description, "additionalProperties": true })
}

pub fn choice(description: &str, values: &[&str], default: &str) -> Value {
    json!({
        "type": "string",
        "description": description,
        "enum": values,
        "default": default,
    })
}

pub fn node() -> Value {
    string("Node name (e.g. 'pve')")
}

pub fn vmid() -> Value {
    json!({
        "type": ["string", "integer"],
        "description": "Guest ID (e.g. '100')",
    })
}

/// Schema for tools addressing one guest on one node
pub fn node_vmid() -> Value {
    object(vec![("node", node()), ("vmid", vmid())], &["node", "vmid"])
}

pub fn node_only() -> Value {
    object(vec![("node", node())], &["node"])
}

pub fn snapshot() -> Value {
    object(
        vec![
            ("node", node()),
            ("vmid", vmid()),
            ("snapname", string("Snapshot name")),
        ],
        &["node", "vmid", "snapname"],
    )
}
