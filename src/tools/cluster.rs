//! Cluster-wide tools

use super::schema::{self, object, tool};
use super::{parse_args, Context, ToolDefinition, ToolError, ToolOutput};
use crate::proxmox::{Params, ProxmoxApi};
use serde::Deserialize;
use serde_json::{json, Value};

const RESOURCE_TYPES: [&str; 4] = ["vm", "storage", "node", "sdn"];

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "get_cluster_status",
            "Get cluster membership and quorum status.",
            schema::empty(),
        ),
        tool(
            "get_cluster_resources",
            "List all cluster resources (guests, storages, nodes, SDN zones), optionally \
             filtered by type.",
            object(
                vec![(
                    "type",
                    json!({
                        "type": "string",
                        "description": "Resource type filter",
                        "enum": RESOURCE_TYPES,
                    }),
                )],
                &[],
            ),
        ),
        tool("get_version", "Get the Proxmox API version.", schema::empty()),
    ]
}

pub async fn call(
    api: &dyn ProxmoxApi,
    name: &str,
    args: &Value,
) -> Option<Result<ToolOutput, ToolError>> {
    let result = match name {
        "get_cluster_status" => get_status(api).await,
        "get_cluster_resources" => get_resources(api, args).await,
        "get_version" => get_version(api).await,
        _ => return None,
    };
    Some(result)
}

async fn get_status(api: &dyn ProxmoxApi) -> Result<ToolOutput, ToolError> {
    let status = api.get("cluster/status").await.context("get cluster status")?;
    Ok(ToolOutput::json(status))
}

#[derive(Deserialize)]
struct ResourceArgs {
    #[serde(rename = "type")]
    kind: Option<String>,
}

async fn get_resources(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: ResourceArgs = parse_args(args)?;

    let mut params = Params::new();
    if let Some(kind) = args.kind.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        if !RESOURCE_TYPES.contains(&kind) {
            return Err(ToolError::InvalidArguments(format!(
                "type must be one of {}, got '{}'",
                RESOURCE_TYPES.join(", "),
                kind
            )));
        }
        params.insert("type".to_string(), json!(kind));
    }

    let resources = api
        .get_with("cluster/resources", params)
        .await
        .context("get cluster resources")?;
    Ok(ToolOutput::json(resources))
}

async fn get_version(api: &dyn ProxmoxApi) -> Result<ToolOutput, ToolError> {
    let version = api.get("version").await.context("get version")?;
    Ok(ToolOutput::json(version))
}
