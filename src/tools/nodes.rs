//! Node and task tools

use super::schema::{self, object, string, integer, tool};
use super::{parse_args, segment, Context, ToolDefinition, ToolError, ToolOutput};
use crate::proxmox::{Params, ProxmoxApi};
use serde::Deserialize;
use serde_json::Value;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "get_nodes",
            "List all nodes in the Proxmox cluster with their status, uptime, CPU and memory usage.",
            schema::empty(),
        ),
        tool(
            "get_node_status",
            "Get detailed status of one node: CPU, memory, load, uptime and versions.",
            schema::node_only(),
        ),
        tool(
            "get_task_status",
            "Get the status of an asynchronous Proxmox task by its UPID.",
            object(
                vec![("node", schema::node()), ("upid", string("Task UPID"))],
                &["node", "upid"],
            ),
        ),
        tool(
            "get_task_log",
            "Read the log lines of a Proxmox task by its UPID.",
            object(
                vec![
                    ("node", schema::node()),
                    ("upid", string("Task UPID")),
                    ("start", integer("First line to return (default 0)")),
                    ("limit", integer("Maximum number of lines")),
                ],
                &["node", "upid"],
            ),
        ),
    ]
}

#[derive(Deserialize)]
struct NodeArgs {
    node: String,
}

#[derive(Deserialize)]
struct TaskArgs {
    node: String,
    upid: String,
    start: Option<u64>,
    limit: Option<u64>,
}

pub async fn call(
    api: &dyn ProxmoxApi,
    name: &str,
    args: &Value,
) -> Option<Result<ToolOutput, ToolError>> {
    let result = match name {
        "get_nodes" => get_nodes(api).await,
        "get_node_status" => get_node_status(api, args).await,
        "get_task_status" => get_task_status(api, args).await,
        "get_task_log" => get_task_log(api, args).await,
        _ => return None,
    };
    Some(result)
}

async fn get_nodes(api: &dyn ProxmoxApi) -> Result<ToolOutput, ToolError> {
    let nodes = api.get("nodes").await.context("get nodes")?;
    Ok(ToolOutput::json(nodes))
}

async fn get_node_status(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: NodeArgs = parse_args(args)?;
    let node = segment("node", &args.node)?;

    let status = api
        .get(&format!("nodes/{}/status", node))
        .await
        .context(format!("get status for node {}", node))?;
    Ok(ToolOutput::json(status))
}

async fn get_task_status(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: TaskArgs = parse_args(args)?;
    let node = segment("node", &args.node)?;
    let upid = segment("upid", &args.upid)?;

    let status = api
        .get(&format!("nodes/{}/tasks/{}/status", node, upid))
        .await
        .context(format!("get task status {} on node {}", upid, node))?;
    Ok(ToolOutput::json(status))
}

async fn get_task_log(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: TaskArgs = parse_args(args)?;
    let node = segment("node", &args.node)?;
    let upid = segment("upid", &args.upid)?;

    let mut params = Params::new();
    if let Some(start) = args.start {
        params.insert("start".to_string(), start.into());
    }
    if let Some(limit) = args.limit {
        params.insert("limit".to_string(), limit.into());
    }

    let log = api
        .get_with(&format!("nodes/{}/tasks/{}/log", node, upid), params)
        .await
        .context(format!("get task log {} on node {}", upid, node))?;
    Ok(ToolOutput::json(log))
}
