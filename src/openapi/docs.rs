//! Swagger UI page for the generated document

use crate::tools::ToolDefinition;
use askama::Template;

#[derive(Template)]
#[template(path = "docs.html")]
pub struct DocsTemplate {
    pub title: String,
    pub version: &'static str,
    pub spec_url: &'static str,
    /// Listed when scripts are disabled
    pub tools: Vec<DocsTool>,
}

pub struct DocsTool {
    pub name: String,
    pub description: String,
}

impl DocsTemplate {
    pub fn new(definitions: &[ToolDefinition]) -> Self {
        Self {
            title: "Proxmox MCP tools".to_string(),
            version: env!("CARGO_PKG_VERSION"),
            spec_url: "/openapi.json",
            tools: definitions
                .iter()
                .map(|d| DocsTool {
                    name: d.name.clone(),
                    description: d.description.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_lists_tools() {
        let page = DocsTemplate::new(&[ToolDefinition {
            name: "get_nodes".to_string(),
            description: "List cluster nodes".to_string(),
            input_schema: json!({}),
        }])
        .render()
        .unwrap();

        assert!(page.contains("/openapi.json"));
        assert!(page.contains("POST /get_nodes"));
    }
}
