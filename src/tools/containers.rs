//! LXC container tools
//!
//! Power actions take a selector instead of a single node/vmid pair:
//! `123`, `pve1:123`, `pve1/web`, `web`, or a comma list of those.

use super::schema::{self, boolean, choice, dict, object, ranged, string, tool};
use super::{
    number, parse_args, segment, text, Context, ToolDefinition, ToolError, ToolOutput, Vmid,
};
use crate::proxmox::{Params, ProxmoxApi, ProxmoxError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info, warn};

const MIB: f64 = 1024.0 * 1024.0;

pub fn definitions() -> Vec<ToolDefinition> {
    let format = || choice("Output format", &["pretty", "json"], "pretty");

    vec![
        tool(
            "get_containers",
            "List LXC containers cluster-wide or on one node, with live CPU and memory usage. \
             Limits fall back to the container config and to recent RRD samples.",
            object(
                vec![
                    ("node", string("Only list containers on this node")),
                    ("include_stats", boolean("Fetch live CPU and memory stats", Some(true))),
                    ("include_raw", boolean("Attach raw status and config (pretty output only)", Some(false))),
                    ("format_style", format()),
                ],
                &[],
            ),
        ),
        tool(
            "get_container_status",
            "Get the current runtime status of a container.",
            schema::node_vmid(),
        ),
        tool(
            "start_container",
            "Start containers matching a selector: '123', 'pve1:123', 'pve1/name', 'name', \
             or a comma-separated list.",
            object(
                vec![("selector", string("Container selector")), ("format_style", format())],
                &["selector"],
            ),
        ),
        tool(
            "stop_container",
            "Stop containers matching a selector. Graceful by default (shutdown with timeout); \
             set graceful=false to force-stop.",
            object(
                vec![
                    ("selector", string("Container selector")),
                    ("graceful", boolean("Shut down cleanly instead of force-stopping", Some(true))),
                    ("timeout_seconds", ranged("Shutdown timeout in seconds (default 10)", 1, 600)),
                    ("format_style", format()),
                ],
                &["selector"],
            ),
        ),
        tool(
            "restart_container",
            "Reboot containers matching a selector.",
            object(
                vec![
                    ("selector", string("Container selector")),
                    ("timeout_seconds", ranged("Shutdown timeout in seconds (default 10)", 1, 600)),
                    ("format_style", format()),
                ],
                &["selector"],
            ),
        ),
        tool(
            "create_container",
            "Create an LXC container. `config` holds the creation parameters \
             (vmid, ostemplate, hostname, storage, memory, net0, ...).",
            object(
                vec![
                    ("node", schema::node()),
                    ("config", dict("Container creation parameters")),
                ],
                &["node", "config"],
            ),
        ),
        tool(
            "update_container_config",
            "Change container configuration keys.",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("changes", dict("Configuration keys and values")),
                ],
                &["node", "vmid", "changes"],
            ),
        ),
        tool("list_container_snapshots", "List snapshots of a container.", schema::node_vmid()),
        tool("create_container_snapshot", "Create a container snapshot.", schema::snapshot()),
        tool("delete_container_snapshot", "Delete a container snapshot.", schema::snapshot()),
        tool(
            "rollback_container_snapshot",
            "Roll a container back to a snapshot.",
            schema::snapshot(),
        ),
    ]
}

pub async fn call(
    api: &dyn ProxmoxApi,
    name: &str,
    args: &Value,
) -> Option<Result<ToolOutput, ToolError>> {
    let result = match name {
        "get_containers" => get_containers(api, args).await,
        "get_container_status" => get_container_status(api, args).await,
        "start_container" => control(api, args, Action::Start).await,
        "stop_container" => control(api, args, Action::Stop).await,
        "restart_container" => control(api, args, Action::Restart).await,
        "create_container" => create_container(api, args).await,
        "update_container_config" => update_config(api, args).await,
        "list_container_snapshots" => list_snapshots(api, args).await,
        "create_container_snapshot" => create_snapshot(api, args).await,
        "delete_container_snapshot" => delete_snapshot(api, args).await,
        "rollback_container_snapshot" => rollback_snapshot(api, args).await,
        _ => return None,
    };
    Some(result)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FormatStyle {
    #[default]
    Pretty,
    Json,
}

/// One term of a container selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorToken {
    /// `123`: this id on any node
    Id(u64),
    /// `pve1:123`
    NodeId { node: String, vmid: u64 },
    /// `pve1/web`: name or hostname on one node
    NodeName { node: String, name: String },
    /// `web`: name or hostname on any node
    Name(String),
}

/// Parse a comma-separated selector
///
/// `node:id` terms whose id is not numeric are dropped.
pub fn parse_selector(selector: &str) -> Vec<SelectorToken> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter_map(|token| {
            let has_colon = token.contains(':');
            let has_slash = token.contains('/');

            if has_colon && !has_slash {
                let (node, vmid) = token.split_once(':')?;
                let vmid = vmid.trim().parse().ok()?;
                return Some(SelectorToken::NodeId {
                    node: node.trim().to_string(),
                    vmid,
                });
            }
            if has_slash && !has_colon {
                let (node, name) = token.split_once('/')?;
                return Some(SelectorToken::NodeName {
                    node: node.trim().to_string(),
                    name: name.trim().to_string(),
                });
            }
            if token.chars().all(|c| c.is_ascii_digit()) {
                return token.parse().ok().map(SelectorToken::Id);
            }
            Some(SelectorToken::Name(token.to_string()))
        })
        .collect()
}

/// A container as listed by `GET nodes/{node}/lxc`
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRef {
    pub node: String,
    pub vmid: u64,
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub status: Option<String>,
}

impl ContainerRef {
    /// Build from one listing entry, which may be an object or a bare id
    pub fn from_listing(node: &str, entry: &Value) -> Option<Self> {
        let vmid = match entry {
            Value::Object(_) => number(entry.get("vmid"))?,
            other => number(Some(other))?,
        };
        if vmid < 0.0 {
            return None;
        }

        Some(Self {
            node: node.to_string(),
            vmid: vmid as u64,
            name: text(entry.get("name")),
            hostname: text(entry.get("hostname")),
            status: text(entry.get("status")),
        })
    }

    pub fn label(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.hostname.clone())
            .unwrap_or_else(|| format!("ct-{}", self.vmid))
    }

    fn answers_to(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name) || self.hostname.as_deref() == Some(name)
    }
}

/// A resolved container to act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub node: String,
    pub vmid: u64,
    pub label: String,
}

/// Match selector tokens against an inventory
///
/// Results are unique by `(node, vmid)` and keep first-seen order.
pub fn resolve_selector(tokens: &[SelectorToken], inventory: &[ContainerRef]) -> Vec<Target> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    let mut push = |ct: &ContainerRef, label: String| {
        if seen.insert((ct.node.clone(), ct.vmid)) {
            targets.push(Target {
                node: ct.node.clone(),
                vmid: ct.vmid,
                label,
            });
        }
    };

    for token in tokens {
        match token {
            SelectorToken::NodeId { node, vmid } => {
                if let Some(ct) = inventory.iter().find(|c| &c.node == node && c.vmid == *vmid) {
                    push(ct, ct.label());
                }
            }
            SelectorToken::NodeName { node, name } => {
                for ct in inventory.iter().filter(|c| &c.node == node && c.answers_to(name)) {
                    push(ct, name.clone());
                }
            }
            SelectorToken::Id(vmid) => {
                for ct in inventory.iter().filter(|c| c.vmid == *vmid) {
                    push(ct, ct.label());
                }
            }
            SelectorToken::Name(name) => {
                for ct in inventory.iter().filter(|c| c.answers_to(name)) {
                    push(ct, name.clone());
                }
            }
        }
    }

    targets
}

/// List containers on one node or on every online node
async fn inventory(api: &dyn ProxmoxApi, node: Option<&str>) -> Result<Vec<ContainerRef>, ToolError> {
    let nodes: Vec<String> = match node {
        Some(node) => vec![segment("node", node)?.to_string()],
        None => {
            let nodes = api.get("nodes").await.context("list nodes")?;
            nodes
                .as_array()
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .filter(|n| n.get("status").and_then(Value::as_str) != Some("offline"))
                .filter_map(|n| text(n.get("node")))
                .collect()
        }
    };

    let mut containers = Vec::new();
    for node in nodes {
        let listing = api
            .get(&format!("nodes/{}/lxc", node))
            .await
            .context(format!("list containers on node {}", node))?;
        containers.extend(
            listing
                .as_array()
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .filter_map(|entry| ContainerRef::from_listing(&node, entry)),
        );
    }
    Ok(containers)
}

#[derive(Deserialize)]
struct ListArgs {
    node: Option<String>,
    #[serde(default = "default_true")]
    include_stats: bool,
    #[serde(default)]
    include_raw: bool,
    #[serde(default)]
    format_style: FormatStyle,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Serialize)]
struct ContainerStats {
    cores: Option<f64>,
    /// Configured memory in MiB
    memory: u64,
    cpu_pct: f64,
    mem_bytes: u64,
    maxmem_bytes: u64,
    mem_pct: Option<f64>,
    unlimited_memory: bool,
}

#[derive(Debug, Serialize)]
struct ContainerRow {
    vmid: String,
    name: String,
    node: String,
    status: Option<String>,
    #[serde(flatten)]
    stats: Option<ContainerStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_config: Option<Value>,
}

/// Read a guest endpoint, treating failures as an empty object
async fn lenient_get(api: &dyn ProxmoxApi, path: &str) -> Value {
    match api.get(path).await {
        Ok(value) if value.is_object() => value,
        Ok(_) => json!({}),
        Err(e) => {
            debug!(path = %path, error = %e, "Ignoring unreadable container endpoint");
            json!({})
        }
    }
}

/// Last RRD sample as `(cpu_pct, mem_bytes, maxmem_bytes)`
async fn rrd_last(api: &dyn ProxmoxApi, base: &str) -> Option<(f64, u64, u64)> {
    let mut params = Params::new();
    params.insert("timeframe".to_string(), json!("hour"));
    params.insert("ds".to_string(), json!("cpu,mem,maxmem"));

    let samples = api.get_with(&format!("{}/rrddata", base), params).await.ok()?;
    let last = samples.as_array()?.last()?;
    if !last.is_object() {
        return None;
    }

    Some((
        number(last.get("cpu")).unwrap_or(0.0) * 100.0,
        number(last.get("mem")).unwrap_or(0.0) as u64,
        number(last.get("maxmem")).unwrap_or(0.0) as u64,
    ))
}

fn configured_memory(config: &Value) -> u64 {
    ["memory", "ram", "maxmem"]
        .iter()
        .find_map(|key| number(config.get(*key)))
        .map(|mib| mib.max(0.0) as u64)
        .unwrap_or(0)
}

fn configured_cores(config: &Value) -> Option<f64> {
    number(config.get("cores")).or_else(|| number(config.get("cpulimit")).filter(|l| *l > 0.0))
}

async fn collect_stats(
    api: &dyn ProxmoxApi,
    ct: &ContainerRef,
    status: &Value,
    config: &Value,
) -> ContainerStats {
    let mut cpu_pct = (number(status.get("cpu")).unwrap_or(0.0) * 10_000.0).round() / 100.0;
    let mut mem_bytes = number(status.get("mem")).unwrap_or(0.0) as u64;
    let mut maxmem_bytes = number(status.get("maxmem")).unwrap_or(0.0) as u64;

    let mut memory = configured_memory(config);
    let swap = number(config.get("swap")).unwrap_or(0.0);
    let unlimited_memory = swap == 0.0 && memory == 0;

    let state = text(status.get("status"))
        .or_else(|| ct.status.clone())
        .unwrap_or_default()
        .to_lowercase();
    if state == "stopped" {
        mem_bytes = 0;
    }
    if maxmem_bytes == 0 && memory > 0 {
        maxmem_bytes = memory * 1024 * 1024;
    }

    if mem_bytes == 0 || maxmem_bytes == 0 || cpu_pct == 0.0 {
        let base = format!("nodes/{}/lxc/{}", ct.node, ct.vmid);
        if let Some((rrd_cpu, rrd_mem, rrd_maxmem)) = rrd_last(api, &base).await {
            if cpu_pct == 0.0 {
                cpu_pct = rrd_cpu;
            }
            if mem_bytes == 0 {
                mem_bytes = rrd_mem;
            }
            if maxmem_bytes == 0 && rrd_maxmem > 0 {
                maxmem_bytes = rrd_maxmem;
                if memory == 0 {
                    memory = (rrd_maxmem as f64 / MIB).round() as u64;
                }
            }
        }
    }

    let mem_pct = (maxmem_bytes > 0)
        .then(|| (mem_bytes as f64 / maxmem_bytes as f64 * 10_000.0).round() / 100.0);

    ContainerStats {
        cores: configured_cores(config),
        memory,
        cpu_pct,
        mem_bytes,
        maxmem_bytes,
        mem_pct,
        unlimited_memory,
    }
}

async fn get_containers(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: ListArgs = parse_args(args)?;
    let containers = inventory(api, args.node.as_deref()).await?;

    let mut rows = Vec::with_capacity(containers.len());
    for ct in &containers {
        let mut row = ContainerRow {
            vmid: ct.vmid.to_string(),
            name: ct.label(),
            node: ct.node.clone(),
            status: ct.status.clone(),
            stats: None,
            raw_status: None,
            raw_config: None,
        };

        if args.include_stats {
            let base = format!("nodes/{}/lxc/{}", ct.node, ct.vmid);
            let status = lenient_get(api, &format!("{}/status/current", base)).await;
            let config = lenient_get(api, &format!("{}/config", base)).await;
            row.stats = Some(collect_stats(api, ct, &status, &config).await);

            if args.include_raw && args.format_style == FormatStyle::Pretty {
                row.raw_status = Some(status);
                row.raw_config = Some(config);
            }
        }

        rows.push(row);
    }

    match args.format_style {
        FormatStyle::Json => Ok(ToolOutput::pretty(json!(rows))),
        FormatStyle::Pretty => Ok(ToolOutput::text(render_containers(&rows))),
    }
}

/// Format a byte count with binary units
fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

fn render_containers(rows: &[ContainerRow]) -> String {
    let mut lines = vec!["Containers".to_string(), String::new()];

    for row in rows {
        lines.push(format!("{} (ID: {})", row.name, row.vmid));
        lines.push(format!(
            "  Status: {}",
            row.status.as_deref().unwrap_or_default().to_uppercase()
        ));
        lines.push(format!("  Node: {}", row.node));

        if let Some(stats) = &row.stats {
            lines.push(format!("  CPU: {:.1}%", stats.cpu_pct));
            lines.push(format!(
                "  CPU Cores: {}",
                stats.cores.map(|c| c.to_string()).unwrap_or_else(|| "N/A".to_string())
            ));

            let memory = if stats.unlimited_memory {
                format!("{} (unlimited)", human_bytes(stats.mem_bytes))
            } else {
                let pct = stats.mem_pct.map(|p| format!(" ({:.1}%)", p)).unwrap_or_default();
                format!(
                    "{} / {}{}",
                    human_bytes(stats.mem_bytes),
                    human_bytes(stats.maxmem_bytes),
                    pct
                )
            };
            lines.push(format!("  Memory: {}", memory));
        }

        if let Some(raw) = &row.raw_status {
            lines.push(format!("  Raw status: {}", raw));
        }
        if let Some(raw) = &row.raw_config {
            lines.push(format!("  Raw config: {}", raw));
        }
        lines.push(String::new());
    }

    lines.join("\n").trim_end().to_string()
}

#[derive(Deserialize)]
struct CtArgs {
    node: String,
    vmid: Vmid,
}

impl CtArgs {
    fn base(&self) -> Result<String, ToolError> {
        Ok(format!("nodes/{}/lxc/{}", segment("node", &self.node)?, self.vmid))
    }

    fn not_found_or(&self, error: ProxmoxError, action: &str) -> ToolError {
        if error.is_not_found() {
            ToolError::NotFound(format!(
                "Container {} not found on node {}",
                self.vmid, self.node
            ))
        } else {
            ToolError::Api {
                action: format!("{} container {}", action, self.vmid),
                source: error,
            }
        }
    }
}

async fn get_container_status(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: CtArgs = parse_args(args)?;
    let status = api
        .get(&format!("{}/status/current", args.base()?))
        .await
        .map_err(|e| args.not_found_or(e, "read status of"))?;
    Ok(ToolOutput::pretty(status))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Start,
    Stop,
    Restart,
}

impl Action {
    fn title(self) -> &'static str {
        match self {
            Action::Start => "Start Containers",
            Action::Stop => "Stop Containers",
            Action::Restart => "Restart Containers",
        }
    }
}

#[derive(Deserialize)]
struct ControlArgs {
    selector: String,
    #[serde(default = "default_true")]
    graceful: bool,
    #[serde(default = "default_timeout")]
    timeout_seconds: u32,
    #[serde(default)]
    format_style: FormatStyle,
}

fn default_timeout() -> u32 {
    10
}

#[derive(Debug, Serialize)]
struct ActionResult {
    ok: bool,
    node: String,
    vmid: u64,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn control(api: &dyn ProxmoxApi, args: &Value, action: Action) -> Result<ToolOutput, ToolError> {
    let args: ControlArgs = parse_args(args)?;
    if !(1..=600).contains(&args.timeout_seconds) {
        return Err(ToolError::InvalidArguments(format!(
            "timeout_seconds must be between 1 and 600, got {}",
            args.timeout_seconds
        )));
    }

    let tokens = parse_selector(&args.selector);
    if tokens.is_empty() {
        return Err(ToolError::InvalidArguments(format!(
            "selector '{}' does not name any container",
            args.selector
        )));
    }

    let inventory = inventory(api, None).await?;
    let targets = resolve_selector(&tokens, &inventory);
    if targets.is_empty() {
        return Err(ToolError::NotFound(format!(
            "No containers matched the selector '{}'",
            args.selector
        )));
    }

    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        let base = format!("nodes/{}/lxc/{}", target.node, target.vmid);
        let mut params = Params::new();
        let endpoint = match action {
            Action::Start => "start",
            Action::Stop if args.graceful => {
                params.insert("timeout".to_string(), json!(args.timeout_seconds));
                "shutdown"
            }
            Action::Stop => "stop",
            Action::Restart => {
                params.insert("timeout".to_string(), json!(args.timeout_seconds));
                "reboot"
            }
        };

        let outcome = api.post(&format!("{}/status/{}", base, endpoint), params).await;
        let result = match outcome {
            Ok(upid) => {
                info!(node = %target.node, vmid = target.vmid, action = endpoint, "Container action issued");
                ActionResult {
                    ok: true,
                    node: target.node,
                    vmid: target.vmid,
                    name: target.label,
                    message: Some(upid),
                    error: None,
                }
            }
            Err(e) => {
                warn!(node = %target.node, vmid = target.vmid, action = endpoint, error = %e, "Container action failed");
                ActionResult {
                    ok: false,
                    node: target.node,
                    vmid: target.vmid,
                    name: target.label,
                    message: None,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    match args.format_style {
        FormatStyle::Json => Ok(ToolOutput::pretty(json!(results))),
        FormatStyle::Pretty => Ok(ToolOutput::text(render_results(action.title(), &results))),
    }
}

fn render_results(title: &str, results: &[ActionResult]) -> String {
    let mut lines = vec![title.to_string(), String::new()];
    for r in results {
        let status = if r.ok { "OK" } else { "FAIL" };
        let detail = match (&r.message, &r.error) {
            (_, Some(error)) => format!(" - {}", error),
            (Some(Value::String(upid)), None) => format!(" - {}", upid),
            _ => String::new(),
        };
        lines.push(format!(
            "{} {} (ID: {}, node: {}){}",
            status, r.name, r.vmid, r.node, detail
        ));
    }
    lines.join("\n")
}

#[derive(Deserialize)]
struct CreateArgs {
    node: String,
    config: Params,
}

async fn create_container(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: CreateArgs = parse_args(args)?;
    let node = segment("node", &args.node)?;

    let upid = api
        .post(&format!("nodes/{}/lxc", node), args.config)
        .await
        .context(format!("create container on node {}", node))?;
    Ok(ToolOutput::task(upid))
}

#[derive(Deserialize)]
struct ConfigArgs {
    #[serde(flatten)]
    ct: CtArgs,
    changes: Params,
}

async fn update_config(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: ConfigArgs = parse_args(args)?;
    if args.changes.is_empty() {
        return Err(ToolError::InvalidArguments("changes must not be empty".to_string()));
    }

    let result = api
        .put(&format!("{}/config", args.ct.base()?), args.changes)
        .await
        .map_err(|e| args.ct.not_found_or(e, "update config of"))?;
    Ok(ToolOutput::task(result))
}

async fn list_snapshots(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: CtArgs = parse_args(args)?;
    let snapshots = api
        .get(&format!("{}/snapshot", args.base()?))
        .await
        .map_err(|e| args.not_found_or(e, "list snapshots of"))?;
    Ok(ToolOutput::pretty(snapshots))
}

#[derive(Deserialize)]
struct SnapshotArgs {
    #[serde(flatten)]
    ct: CtArgs,
    snapname: String,
}

async fn create_snapshot(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: SnapshotArgs = parse_args(args)?;
    let mut params = Params::new();
    params.insert("snapname".to_string(), json!(segment("snapname", &args.snapname)?));

    let upid = api
        .post(&format!("{}/snapshot", args.ct.base()?), params)
        .await
        .map_err(|e| args.ct.not_found_or(e, "snapshot"))?;
    Ok(ToolOutput::task(upid))
}

async fn delete_snapshot(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: SnapshotArgs = parse_args(args)?;
    let snapname = segment("snapname", &args.snapname)?;
    let upid = api
        .delete(&format!("{}/snapshot/{}", args.ct.base()?, snapname), Params::new())
        .await
        .context(format!("delete snapshot {} of container {}", snapname, args.ct.vmid))?;
    Ok(ToolOutput::task(upid))
}

async fn rollback_snapshot(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: SnapshotArgs = parse_args(args)?;
    let snapname = segment("snapname", &args.snapname)?;
    let upid = api
        .post(
            &format!("{}/snapshot/{}/rollback", args.ct.base()?, snapname),
            Params::new(),
        )
        .await
        .context(format!("roll back container {} to snapshot {}", args.ct.vmid, snapname))?;
    Ok(ToolOutput::task(upid))
}
