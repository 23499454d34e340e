//! Node administration tools: services, network, updates, disks, backups, Ceph

use super::schema::{self, choice, dict, object, string, tool};
use super::{parse_args, segment, Context, ToolDefinition, ToolError, ToolOutput};
use crate::proxmox::{Params, ProxmoxApi};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// Read-only tools that GET `nodes/{node}/{suffix}`
const NODE_READS: [(&str, &str, &str); 8] = [
    ("list_services", "services", "List system services on a node and their state."),
    ("network_get", "network", "List network interfaces configured on a node."),
    ("list_updates", "apt/update", "List pending package updates on a node."),
    ("list_repositories", "apt/repositories", "List APT repositories configured on a node."),
    ("get_certificates", "certificates/info", "Show TLS certificates installed on a node."),
    ("list_disks", "disks/list", "List physical disks on a node."),
    ("ceph_status", "ceph/status", "Get Ceph cluster health as seen from a node."),
    ("ceph_df", "ceph/df", "Get Ceph pool and raw capacity usage."),
];

pub fn definitions() -> Vec<ToolDefinition> {
    let mut tools: Vec<ToolDefinition> = NODE_READS
        .iter()
        .map(|(name, _, description)| tool(name, description, schema::node_only()))
        .collect();

    tools.extend([
        tool(
            "service_action",
            "Start, stop, restart or reload a system service on a node.",
            object(
                vec![
                    ("node", schema::node()),
                    ("service", string("Service name (e.g. 'pveproxy')")),
                    (
                        "action",
                        choice("Action", &["start", "stop", "restart", "reload"], "restart"),
                    ),
                ],
                &["node", "service", "action"],
            ),
        ),
        tool(
            "network_apply",
            "Apply pending network configuration changes on a node.",
            schema::node_only(),
        ),
        tool(
            "vzdump",
            "Start a vzdump backup job on a node (e.g. params {\"vmid\": \"100\", \
             \"storage\": \"backup\", \"mode\": \"snapshot\"}).",
            object(
                vec![("node", schema::node()), ("params", dict("vzdump parameters"))],
                &["node", "params"],
            ),
        ),
    ]);
    tools
}

pub async fn call(
    api: &dyn ProxmoxApi,
    name: &str,
    args: &Value,
) -> Option<Result<ToolOutput, ToolError>> {
    if let Some((_, suffix, _)) = NODE_READS.iter().find(|(tool_name, _, _)| *tool_name == name) {
        return Some(node_read(api, args, suffix).await);
    }

    let result = match name {
        "service_action" => service_action(api, args).await,
        "network_apply" => network_apply(api, args).await,
        "vzdump" => vzdump(api, args).await,
        _ => return None,
    };
    Some(result)
}

#[derive(Deserialize)]
struct NodeArgs {
    node: String,
}

async fn node_read(api: &dyn ProxmoxApi, args: &Value, suffix: &str) -> Result<ToolOutput, ToolError> {
    let args: NodeArgs = parse_args(args)?;
    let node = segment("node", &args.node)?;

    let result = api
        .get(&format!("nodes/{}/{}", node, suffix))
        .await
        .context(format!("read {} on node {}", suffix, node))?;
    Ok(ToolOutput::json(result))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ServiceAction {
    Start,
    Stop,
    Restart,
    Reload,
}

impl ServiceAction {
    fn as_str(self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::Reload => "reload",
        }
    }
}

#[derive(Deserialize)]
struct ServiceArgs {
    node: String,
    service: String,
    action: ServiceAction,
}

async fn service_action(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: ServiceArgs = parse_args(args)?;
    let node = segment("node", &args.node)?;
    let service = segment("service", &args.service)?;
    let action = args.action.as_str();

    let upid = api
        .post(&format!("nodes/{}/services/{}/{}", node, service, action), Params::new())
        .await
        .context(format!("{} service {} on node {}", action, service, node))?;

    info!(node = %node, service = %service, action, "Service action issued");
    Ok(ToolOutput::task(upid))
}

async fn network_apply(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: NodeArgs = parse_args(args)?;
    let node = segment("node", &args.node)?;

    let upid = api
        .put(&format!("nodes/{}/network", node), Params::new())
        .await
        .context(format!("apply network configuration on node {}", node))?;

    info!(node = %node, "Network configuration applied");
    Ok(ToolOutput::task(upid))
}

#[derive(Deserialize)]
struct VzdumpArgs {
    node: String,
    params: Params,
}

async fn vzdump(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: VzdumpArgs = parse_args(args)?;
    let node = segment("node", &args.node)?;
    if !["vmid", "all", "pool"].iter().any(|k| args.params.contains_key(*k)) {
        return Err(ToolError::InvalidArguments(
            "vzdump params must select guests with vmid, pool or all".to_string(),
        ));
    }

    let upid = api
        .post(&format!("nodes/{}/vzdump", node), args.params)
        .await
        .context(format!("start backup on node {}", node))?;

    info!(node = %node, "Backup job started");
    Ok(ToolOutput::task(upid))
}
