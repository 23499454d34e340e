//! QEMU virtual machine tools

use super::schema::{self, boolean, dict, object, ranged, string, tool};
use super::{
    number, parse_args, segment, text, Context, ToolDefinition, ToolError, ToolOutput, Vmid,
};
use crate::proxmox::{Params, ProxmoxApi, ProxmoxError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(500);
const EXEC_POLL_ATTEMPTS: u32 = 60;
const TASK_POLL_INTERVAL: Duration = Duration::from_secs(1);
const TASK_POLL_ATTEMPTS: u32 = 60;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "get_vms",
            "List virtual machines across the cluster with status, node, CPU and memory. \
             Set include_config to also read each VM's configuration.",
            object(
                vec![
                    ("node", string("Only list VMs on this node")),
                    ("include_config", boolean("Fetch each VM's config (slower)", Some(false))),
                ],
                &[],
            ),
        ),
        tool(
            "get_vm_status",
            "Get the current runtime status of a VM.",
            schema::node_vmid(),
        ),
        tool(
            "create_vm",
            "Create a new VM. Storage is auto-detected when omitted; disk format and cloud-init \
             drive follow the storage type. The guest agent is enabled.",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("name", string("VM name (e.g. 'web-server')")),
                    ("cpus", ranged("Number of CPU cores", 1, 32)),
                    ("memory", ranged("Memory in MiB (e.g. 2048)", 512, 131072)),
                    ("disk_size", ranged("Disk size in GiB", 5, 1000)),
                    ("storage", string("Storage id (auto-detected when omitted)")),
                    ("ostype", string("OS type (default 'l26' for Linux)")),
                ],
                &["node", "vmid", "name", "cpus", "memory", "disk_size"],
            ),
        ),
        tool("start_vm", "Start a VM. Does nothing if it is already running.", schema::node_vmid()),
        tool(
            "stop_vm",
            "Force-stop a VM immediately. Does nothing if it is already stopped.",
            schema::node_vmid(),
        ),
        tool(
            "shutdown_vm",
            "Gracefully shut down a VM through ACPI or the guest agent.",
            schema::node_vmid(),
        ),
        tool("reset_vm", "Hard-reset a running VM.", schema::node_vmid()),
        tool(
            "delete_vm",
            "Permanently delete a VM with its disks and snapshots. A running VM is refused \
             unless force is set, in which case it is stopped first.",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("force", boolean("Stop the VM first if it is running", Some(false))),
                ],
                &["node", "vmid"],
            ),
        ),
        tool(
            "execute_vm_command",
            "Run a command inside a running VM through the QEMU guest agent and return its \
             output and exit code.",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("command", string("Command to run (e.g. 'uname -a')")),
                ],
                &["node", "vmid", "command"],
            ),
        ),
        tool("get_vm_snapshots", "List snapshots of a VM.", schema::node_vmid()),
        tool(
            "create_vm_snapshot",
            "Create a VM snapshot, optionally including RAM state.",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("snapname", string("Snapshot name")),
                    ("vmstate", boolean("Include RAM state", None)),
                    ("description", string("Snapshot description")),
                ],
                &["node", "vmid", "snapname"],
            ),
        ),
        tool("delete_vm_snapshot", "Delete a VM snapshot.", schema::snapshot()),
        tool("rollback_vm_snapshot", "Roll a VM back to a snapshot.", schema::snapshot()),
        tool(
            "clone_vm",
            "Clone a VM or template.",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("newid", schema::vmid()),
                    ("name", string("Name of the new VM")),
                    ("target", string("Target node")),
                    ("full", boolean("Full clone instead of linked clone", None)),
                    ("storage", string("Target storage for full clones")),
                ],
                &["node", "vmid", "newid"],
            ),
        ),
        tool(
            "migrate_vm",
            "Migrate a VM to another node.",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("target", string("Target node")),
                    ("online", boolean("Live-migrate a running VM", None)),
                ],
                &["node", "vmid", "target"],
            ),
        ),
        tool(
            "update_vm_config",
            "Change VM configuration keys (e.g. {\"memory\": 4096, \"onboot\": true}).",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("changes", dict("Configuration keys and values")),
                ],
                &["node", "vmid", "changes"],
            ),
        ),
        tool(
            "resize_vm_disk",
            "Resize a VM disk (e.g. disk 'scsi0', size '+10G').",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("disk", string("Disk slot (e.g. 'scsi0')")),
                    ("size", string("New size or increment (e.g. '+10G', '64G')")),
                ],
                &["node", "vmid", "disk", "size"],
            ),
        ),
        tool("vm_vncproxy", "Create a VNC proxy ticket for a VM console.", schema::node_vmid()),
        tool("vm_spiceproxy", "Create a SPICE proxy configuration for a VM.", schema::node_vmid()),
        tool(
            "vm_move_disk",
            "Move a VM disk to another storage.",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("disk", string("Disk slot (e.g. 'scsi0')")),
                    ("storage", string("Target storage")),
                    ("delete", boolean("Remove the source disk after moving", None)),
                ],
                &["node", "vmid", "disk", "storage"],
            ),
        ),
        tool(
            "vm_import_disk",
            "Import a disk image into a VM slot.",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("source", string("Source volume or absolute path")),
                    ("storage", string("Target storage")),
                    ("disk", string("Slot to attach the imported disk to (default 'scsi1')")),
                ],
                &["node", "vmid", "source", "storage"],
            ),
        ),
        tool(
            "vm_attach_disk",
            "Attach a disk to a VM slot (e.g. disk 'scsi1', opts 'local-lvm:10,format=raw').",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("disk", string("Slot (e.g. 'scsi1')")),
                    (
                        "opts",
                        json!({
                            "type": ["string", "object"],
                            "description": "Drive specification string or key/value options",
                        }),
                    ),
                ],
                &["node", "vmid", "disk", "opts"],
            ),
        ),
        tool(
            "vm_detach_disk",
            "Detach a disk from a VM slot. The volume becomes an unused disk.",
            object(
                vec![
                    ("node", schema::node()),
                    ("vmid", schema::vmid()),
                    ("disk", string("Slot (e.g. 'scsi1')")),
                ],
                &["node", "vmid", "disk"],
            ),
        ),
    ]
}

pub async fn call(
    api: &dyn ProxmoxApi,
    name: &str,
    args: &Value,
) -> Option<Result<ToolOutput, ToolError>> {
    let result = match name {
        "get_vms" => get_vms(api, args).await,
        "get_vm_status" => get_vm_status(api, args).await,
        "create_vm" => create_vm(api, args).await,
        "start_vm" => power(api, args, PowerAction::Start).await,
        "stop_vm" => power(api, args, PowerAction::Stop).await,
        "shutdown_vm" => power(api, args, PowerAction::Shutdown).await,
        "reset_vm" => power(api, args, PowerAction::Reset).await,
        "delete_vm" => delete_vm(api, args).await,
        "execute_vm_command" => execute_command(api, args).await,
        "get_vm_snapshots" => get_snapshots(api, args).await,
        "create_vm_snapshot" => create_snapshot(api, args).await,
        "delete_vm_snapshot" => delete_snapshot(api, args).await,
        "rollback_vm_snapshot" => rollback_snapshot(api, args).await,
        "clone_vm" => clone_vm(api, args).await,
        "migrate_vm" => migrate_vm(api, args).await,
        "update_vm_config" => update_config(api, args).await,
        "resize_vm_disk" => resize_disk(api, args).await,
        "vm_vncproxy" => console_proxy(api, args, "vncproxy").await,
        "vm_spiceproxy" => console_proxy(api, args, "spiceproxy").await,
        "vm_move_disk" => move_disk(api, args).await,
        "vm_import_disk" => import_disk(api, args).await,
        "vm_attach_disk" => attach_disk(api, args).await,
        "vm_detach_disk" => detach_disk(api, args).await,
        _ => return None,
    };
    Some(result)
}

#[derive(Deserialize)]
struct VmArgs {
    node: String,
    vmid: Vmid,
}

impl VmArgs {
    fn base(&self) -> Result<String, ToolError> {
        Ok(format!("nodes/{}/qemu/{}", segment("node", &self.node)?, self.vmid))
    }
}

#[derive(Deserialize)]
struct ListArgs {
    node: Option<String>,
    #[serde(default)]
    include_config: bool,
}

async fn get_vms(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: ListArgs = parse_args(args)?;

    let nodes: Vec<String> = match &args.node {
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

    let mut vms = Vec::new();
    for node in nodes {
        let listing = api
            .get(&format!("nodes/{}/qemu", node))
            .await
            .context(format!("list VMs on node {}", node))?;

        for vm in listing.as_array().map(Vec::as_slice).unwrap_or_default() {
            let Some(vmid) = number(vm.get("vmid")) else {
                continue;
            };
            let vmid = vmid as u64;

            let mut entry = json!({
                "vmid": vmid,
                "name": vm.get("name").cloned().unwrap_or(Value::Null),
                "status": vm.get("status").cloned().unwrap_or(Value::Null),
                "node": node,
                "cpus": vm.get("cpus").cloned().unwrap_or(Value::Null),
                "mem": vm.get("mem").cloned().unwrap_or(Value::Null),
                "maxmem": vm.get("maxmem").cloned().unwrap_or(Value::Null),
            });

            if args.include_config {
                let config = api
                    .get(&format!("nodes/{}/qemu/{}/config", node, vmid))
                    .await
                    .context(format!("read config of VM {}", vmid))?;
                let cores = number(config.get("cores")).unwrap_or(1.0);
                let sockets = number(config.get("sockets")).unwrap_or(1.0);
                entry["cpus"] = json!((cores * sockets) as u64);
                entry["config"] = config;
            }

            vms.push(entry);
        }
    }

    Ok(ToolOutput::json(Value::Array(vms)))
}

async fn get_vm_status(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: VmArgs = parse_args(args)?;
    let status = current_status(api, &args).await?;
    Ok(ToolOutput::json(status))
}

/// Read `status/current`, turning a missing guest into `NotFound`
async fn current_status(api: &dyn ProxmoxApi, args: &VmArgs) -> Result<Value, ToolError> {
    api.get(&format!("{}/status/current", args.base()?))
        .await
        .map_err(|e| not_found_or(e, args, "read status of"))
}

fn not_found_or(error: ProxmoxError, args: &VmArgs, action: &str) -> ToolError {
    if error.is_not_found() {
        ToolError::NotFound(format!("VM {} not found on node {}", args.vmid, args.node))
    } else {
        ToolError::Api {
            action: format!("{} VM {}", action, args.vmid),
            source: error,
        }
    }
}

fn task_id(upid: &Value) -> String {
    text(Some(upid)).unwrap_or_else(|| upid.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PowerAction {
    Start,
    Stop,
    Shutdown,
    Reset,
}

async fn power(
    api: &dyn ProxmoxApi,
    args: &Value,
    action: PowerAction,
) -> Result<ToolOutput, ToolError> {
    let args: VmArgs = parse_args(args)?;
    let status = current_status(api, &args).await?;
    let state = status.get("status").and_then(Value::as_str).unwrap_or_default();
    let vmid = args.vmid;

    let (endpoint, verb) = match (action, state) {
        (PowerAction::Start, "running") => {
            return Ok(ToolOutput::text(format!("VM {} is already running", vmid)))
        }
        (PowerAction::Stop | PowerAction::Shutdown, "stopped") => {
            return Ok(ToolOutput::text(format!("VM {} is already stopped", vmid)))
        }
        (PowerAction::Reset, "stopped") => {
            return Ok(ToolOutput::text(format!(
                "Cannot reset VM {}: VM is currently stopped\nUse start_vm to start it first",
                vmid
            )))
        }
        (PowerAction::Start, _) => ("start", "start initiated successfully"),
        (PowerAction::Stop, _) => ("stop", "stop initiated successfully"),
        (PowerAction::Shutdown, _) => ("shutdown", "graceful shutdown initiated"),
        (PowerAction::Reset, _) => ("reset", "reset initiated successfully"),
    };

    let upid = api
        .post(&format!("{}/status/{}", args.base()?, endpoint), Params::new())
        .await
        .map_err(|e| not_found_or(e, &args, endpoint))?;

    info!(node = %args.node, vmid = %vmid, action = endpoint, "VM power action issued");
    Ok(ToolOutput::text(format!(
        "VM {} {}\nTask ID: {}",
        vmid,
        verb,
        task_id(&upid)
    )))
}

#[derive(Deserialize)]
struct DeleteArgs {
    #[serde(flatten)]
    vm: VmArgs,
    #[serde(default)]
    force: bool,
}

async fn delete_vm(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: DeleteArgs = parse_args(args)?;
    let vm = &args.vm;
    let status = current_status(api, vm).await?;

    let label = status
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("VM-{}", vm.vmid));
    let running = status.get("status").and_then(Value::as_str) == Some("running");
    let node = segment("node", &vm.node)?;

    let mut lines = Vec::new();
    if running {
        if !args.force {
            return Err(ToolError::Precondition(format!(
                "VM {} ({}) is currently running. Stop it first or use force=true to stop and delete.",
                vm.vmid, label
            )));
        }

        let upid = api
            .post(&format!("{}/status/stop", vm.base()?), Params::new())
            .await
            .map_err(|e| not_found_or(e, vm, "stop"))?;
        wait_for_task(api, node, &upid).await?;
        lines.push(format!("Stopped VM {} ({}) before deletion", vm.vmid, label));
    }

    let upid = api
        .delete(&vm.base()?, Params::new())
        .await
        .map_err(|e| not_found_or(e, vm, "delete"))?;

    info!(node = %vm.node, vmid = %vm.vmid, forced = running, "VM deletion issued");
    lines.push(format!(
        "VM {} ({}) deletion initiated on node {}. Its configuration, disks and snapshots \
         will be removed permanently.",
        vm.vmid, label, vm.node
    ));
    lines.push(format!("Task ID: {}", task_id(&upid)));

    Ok(ToolOutput::text(lines.join("\n")))
}

/// Wait for a task to leave the running state
///
/// Non-string results carry no task id and return immediately.
pub(crate) async fn wait_for_task(
    api: &dyn ProxmoxApi,
    node: &str,
    upid: &Value,
) -> Result<(), ToolError> {
    let Some(upid) = upid.as_str() else {
        return Ok(());
    };
    let path = format!("nodes/{}/tasks/{}/status", node, upid);

    for attempt in 0..TASK_POLL_ATTEMPTS {
        let status = api.get(&path).await.context(format!("poll task {}", upid))?;
        if status.get("status").and_then(Value::as_str) == Some("stopped") {
            let exit = status.get("exitstatus").and_then(Value::as_str).unwrap_or("OK");
            if exit != "OK" {
                return Err(ToolError::Precondition(format!("Task {} failed: {}", upid, exit)));
            }
            return Ok(());
        }
        debug!(upid = %upid, attempt, "Task still running");
        tokio::time::sleep(TASK_POLL_INTERVAL).await;
    }

    Err(ToolError::Precondition(format!(
        "Task {} did not finish within {} seconds",
        upid,
        TASK_POLL_ATTEMPTS as u64 * TASK_POLL_INTERVAL.as_secs()
    )))
}

#[derive(Deserialize)]
struct CreateArgs {
    node: String,
    vmid: Vmid,
    name: String,
    cpus: u32,
    memory: u32,
    disk_size: u32,
    storage: Option<String>,
    ostype: Option<String>,
}

impl CreateArgs {
    fn validate(&self) -> Result<(), ToolError> {
        let checks = [
            ("cpus", self.cpus, 1, 32),
            ("memory", self.memory, 512, 131_072),
            ("disk_size", self.disk_size, 5, 1000),
        ];
        for (field, value, min, max) in checks {
            if !(min..=max).contains(&value) {
                return Err(ToolError::InvalidArguments(format!(
                    "{} must be between {} and {}, got {}",
                    field, min, max, value
                )));
            }
        }
        if self.name.trim().is_empty() {
            return Err(ToolError::InvalidArguments("name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Disk format and drive entries for a new VM on a storage of the given type
///
/// Block storages (lvm, lvmthin) get a raw disk and no cloud-init drive;
/// file storages (dir, nfs, cifs) get qcow2 plus an `ide2` cloud-init drive.
pub fn disk_layout(
    storage: &str,
    storage_type: &str,
    disk_gb: u32,
) -> (&'static str, Vec<(String, String)>) {
    match storage_type {
        "dir" | "nfs" | "cifs" => (
            "qcow2",
            vec![
                ("scsi0".to_string(), format!("{}:{},format=qcow2", storage, disk_gb)),
                ("ide2".to_string(), format!("{}:cloudinit", storage)),
            ],
        ),
        _ => (
            "raw",
            vec![("scsi0".to_string(), format!("{}:{},format=raw", storage, disk_gb))],
        ),
    }
}

fn supports_images(storage: &Value) -> bool {
    storage
        .get("content")
        .and_then(Value::as_str)
        .map(|c| c.split(',').any(|kind| kind.trim() == "images"))
        .unwrap_or(false)
}

fn pick_storage<'a>(storages: &'a [Value], requested: Option<&str>) -> Result<&'a Value, ToolError> {
    let named = |name: &str| {
        storages
            .iter()
            .find(|s| s.get("storage").and_then(Value::as_str) == Some(name))
    };

    if let Some(requested) = requested {
        let storage = named(requested).ok_or_else(|| {
            ToolError::Precondition(format!("Storage '{}' not found on this node", requested))
        })?;
        if !supports_images(storage) {
            return Err(ToolError::Precondition(format!(
                "Storage '{}' does not support VM images",
                requested
            )));
        }
        return Ok(storage);
    }

    ["local-lvm", "vm-storage"]
        .into_iter()
        .filter_map(named)
        .find(|s| supports_images(s))
        .or_else(|| storages.iter().find(|s| supports_images(s)))
        .ok_or_else(|| ToolError::Precondition("No suitable storage found for VM images".to_string()))
}

async fn create_vm(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: CreateArgs = parse_args(args)?;
    args.validate()?;
    let node = segment("node", &args.node)?;
    let vmid = args.vmid;

    match api.get(&format!("nodes/{}/qemu/{}/config", node, vmid)).await {
        Ok(_) => {
            return Err(ToolError::Precondition(format!(
                "VM {} already exists on node {}",
                vmid, node
            )))
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            return Err(ToolError::Api {
                action: format!("check whether VM {} exists", vmid),
                source: e,
            })
        }
    }

    let storages = api
        .get(&format!("nodes/{}/storage", node))
        .await
        .context(format!("list storage on node {}", node))?;
    let storages = storages.as_array().map(Vec::as_slice).unwrap_or_default();
    let storage = pick_storage(storages, args.storage.as_deref())?;

    let storage_name = text(storage.get("storage")).unwrap_or_default();
    let storage_type = text(storage.get("type")).unwrap_or_default();
    let (format, drives) = disk_layout(&storage_name, &storage_type, args.disk_size);
    let ostype = args.ostype.clone().unwrap_or_else(|| "l26".to_string());

    let mut params = Params::new();
    params.insert("vmid".to_string(), vmid.into());
    params.insert("name".to_string(), json!(args.name.trim()));
    params.insert("cores".to_string(), json!(args.cpus));
    params.insert("memory".to_string(), json!(args.memory));
    params.insert("ostype".to_string(), json!(ostype));
    params.insert("scsihw".to_string(), json!("virtio-scsi-pci"));
    params.insert("boot".to_string(), json!("order=scsi0"));
    params.insert("agent".to_string(), json!("1"));
    params.insert("vga".to_string(), json!("std"));
    params.insert("net0".to_string(), json!("virtio,bridge=vmbr0"));
    for (key, value) in &drives {
        params.insert(key.clone(), json!(value));
    }

    let upid = api
        .post(&format!("nodes/{}/qemu", node), params)
        .await
        .context(format!("create VM {}", vmid))?;

    info!(node = %node, vmid = %vmid, storage = %storage_name, "VM creation issued");

    let mut text = format!(
        "VM {vmid} created successfully\n\n\
         Configuration:\n  \
         Name: {name}\n  \
         Node: {node}\n  \
         CPU cores: {cpus}\n  \
         Memory: {memory} MiB ({gib:.1} GiB)\n  \
         Disk: {disk} GiB on {storage} ({format})\n  \
         Storage type: {storage_type}\n  \
         OS type: {ostype}\n  \
         Network: virtio on vmbr0\n  \
         QEMU guest agent: enabled",
        vmid = vmid,
        name = args.name.trim(),
        node = node,
        cpus = args.cpus,
        memory = args.memory,
        gib = args.memory as f64 / 1024.0,
        disk = args.disk_size,
        storage = storage_name,
        format = format,
        storage_type = storage_type,
        ostype = ostype,
    );
    if matches!(storage_type.as_str(), "lvm" | "lvmthin") {
        text.push_str("\n  Note: no cloud-init drive was added on LVM storage");
    }
    text.push_str(&format!("\n\nTask ID: {}", task_id(&upid)));

    Ok(ToolOutput::text(text))
}

#[derive(Deserialize)]
struct CommandArgs {
    #[serde(flatten)]
    vm: VmArgs,
    command: CommandLine,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandLine {
    Line(String),
    Argv(Vec<String>),
}

impl CommandLine {
    fn argv(&self) -> Vec<String> {
        match self {
            CommandLine::Line(line) => split_command(line),
            CommandLine::Argv(argv) => argv.clone(),
        }
    }
}

/// Split a command line into arguments, honouring single and double quotes
pub(crate) fn split_command(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_arg = true;
            }
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    in_arg = true;
                }
            }
            (None, c) if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args
}

fn exited(status: &Value) -> bool {
    match status.get("exited") {
        Some(Value::Bool(b)) => *b,
        Some(other) => number(Some(other)).map(|n| n != 0.0).unwrap_or(false),
        None => false,
    }
}

fn exec_result(status: &Value) -> Value {
    let output = status
        .get("out-data")
        .or_else(|| status.get("out"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let error = status
        .get("err-data")
        .or_else(|| status.get("err"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let exit_code = number(status.get("exitcode")).map(|c| c as i64).unwrap_or(0);

    json!({
        "success": exit_code == 0,
        "output": output,
        "error": error,
        "exit_code": exit_code,
    })
}

async fn execute_command(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: CommandArgs = parse_args(args)?;
    let vm = &args.vm;
    let argv = args.command.argv();
    if argv.is_empty() {
        return Err(ToolError::InvalidArguments("command must not be empty".to_string()));
    }

    let status = current_status(api, vm).await?;
    if status.get("status").and_then(Value::as_str) != Some("running") {
        return Err(ToolError::Precondition(format!(
            "VM {} on node {} is not running",
            vm.vmid, vm.node
        )));
    }

    info!(node = %vm.node, vmid = %vm.vmid, program = %argv[0], "Executing command via guest agent");

    let mut params = Params::new();
    params.insert("command".to_string(), json!(argv));
    let started = api
        .post(&format!("{}/agent/exec", vm.base()?), params)
        .await
        .map_err(|e| not_found_or(e, vm, "execute command on"))?;

    // Older agents answer synchronously.
    if started.get("exitcode").is_some() || started.get("out").is_some() {
        return Ok(ToolOutput::json(exec_result(&started)));
    }

    let pid = number(started.get("pid")).ok_or_else(|| ToolError::Api {
        action: format!("execute command on VM {}", vm.vmid),
        source: ProxmoxError::Decode(format!("guest agent returned no pid: {}", started)),
    })? as u64;

    let status_path = format!("{}/agent/exec-status", vm.base()?);
    for attempt in 0..EXEC_POLL_ATTEMPTS {
        let mut query = Params::new();
        query.insert("pid".to_string(), json!(pid));
        let status = api
            .get_with(&status_path, query)
            .await
            .context(format!("read command status on VM {}", vm.vmid))?;

        if exited(&status) {
            return Ok(ToolOutput::json(exec_result(&status)));
        }
        debug!(pid, attempt, "Guest command still running");
        tokio::time::sleep(EXEC_POLL_INTERVAL).await;
    }

    Ok(ToolOutput::json(json!({
        "success": false,
        "output": "",
        "error": format!(
            "command still running after {} seconds (pid {})",
            EXEC_POLL_ATTEMPTS as u64 * EXEC_POLL_INTERVAL.as_millis() as u64 / 1000,
            pid
        ),
        "exit_code": Value::Null,
    })))
}

async fn get_snapshots(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: VmArgs = parse_args(args)?;
    let snapshots = api
        .get(&format!("{}/snapshot", args.base()?))
        .await
        .map_err(|e| not_found_or(e, &args, "list snapshots of"))?;
    Ok(ToolOutput::json(snapshots))
}

#[derive(Deserialize)]
struct SnapshotArgs {
    #[serde(flatten)]
    vm: VmArgs,
    snapname: String,
    vmstate: Option<bool>,
    description: Option<String>,
}

async fn create_snapshot(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: SnapshotArgs = parse_args(args)?;
    let mut params = Params::new();
    params.insert("snapname".to_string(), json!(segment("snapname", &args.snapname)?));
    if let Some(vmstate) = args.vmstate {
        params.insert("vmstate".to_string(), json!(vmstate));
    }
    if let Some(description) = args.description {
        params.insert("description".to_string(), json!(description));
    }

    let upid = api
        .post(&format!("{}/snapshot", args.vm.base()?), params)
        .await
        .map_err(|e| not_found_or(e, &args.vm, "create snapshot of"))?;
    Ok(ToolOutput::task(upid))
}

async fn delete_snapshot(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: SnapshotArgs = parse_args(args)?;
    let snapname = segment("snapname", &args.snapname)?;
    let upid = api
        .delete(&format!("{}/snapshot/{}", args.vm.base()?, snapname), Params::new())
        .await
        .context(format!("delete snapshot {} of VM {}", snapname, args.vm.vmid))?;
    Ok(ToolOutput::task(upid))
}

async fn rollback_snapshot(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: SnapshotArgs = parse_args(args)?;
    let snapname = segment("snapname", &args.snapname)?;
    let upid = api
        .post(
            &format!("{}/snapshot/{}/rollback", args.vm.base()?, snapname),
            Params::new(),
        )
        .await
        .context(format!("roll back VM {} to snapshot {}", args.vm.vmid, snapname))?;
    Ok(ToolOutput::task(upid))
}

#[derive(Deserialize)]
struct CloneArgs {
    #[serde(flatten)]
    vm: VmArgs,
    newid: Vmid,
    name: Option<String>,
    target: Option<String>,
    full: Option<bool>,
    storage: Option<String>,
}

async fn clone_vm(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: CloneArgs = parse_args(args)?;
    let mut params = Params::new();
    params.insert("newid".to_string(), args.newid.into());
    if let Some(name) = args.name {
        params.insert("name".to_string(), json!(name));
    }
    if let Some(target) = args.target {
        params.insert("target".to_string(), json!(target));
    }
    if let Some(full) = args.full {
        params.insert("full".to_string(), json!(full));
    }
    if let Some(storage) = args.storage {
        params.insert("storage".to_string(), json!(storage));
    }

    let upid = api
        .post(&format!("{}/clone", args.vm.base()?), params)
        .await
        .map_err(|e| not_found_or(e, &args.vm, "clone"))?;
    Ok(ToolOutput::task(upid))
}

#[derive(Deserialize)]
struct MigrateArgs {
    #[serde(flatten)]
    vm: VmArgs,
    target: String,
    online: Option<bool>,
}

async fn migrate_vm(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: MigrateArgs = parse_args(args)?;
    let mut params = Params::new();
    params.insert("target".to_string(), json!(segment("target", &args.target)?));
    if let Some(online) = args.online {
        params.insert("online".to_string(), json!(online));
    }

    let upid = api
        .post(&format!("{}/migrate", args.vm.base()?), params)
        .await
        .map_err(|e| not_found_or(e, &args.vm, "migrate"))?;
    Ok(ToolOutput::task(upid))
}

#[derive(Deserialize)]
struct ConfigArgs {
    #[serde(flatten)]
    vm: VmArgs,
    changes: Params,
}

async fn update_config(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: ConfigArgs = parse_args(args)?;
    if args.changes.is_empty() {
        return Err(ToolError::InvalidArguments("changes must not be empty".to_string()));
    }

    let upid = api
        .post(&format!("{}/config", args.vm.base()?), args.changes)
        .await
        .map_err(|e| not_found_or(e, &args.vm, "update config of"))?;
    Ok(ToolOutput::task(upid))
}

#[derive(Deserialize)]
struct ResizeArgs {
    #[serde(flatten)]
    vm: VmArgs,
    disk: String,
    size: String,
}

async fn resize_disk(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: ResizeArgs = parse_args(args)?;
    let mut params = Params::new();
    params.insert("disk".to_string(), json!(args.disk.trim()));
    params.insert("size".to_string(), json!(args.size.trim()));

    let upid = api
        .put(&format!("{}/resize", args.vm.base()?), params)
        .await
        .map_err(|e| not_found_or(e, &args.vm, "resize disk of"))?;
    Ok(ToolOutput::task(upid))
}

async fn console_proxy(
    api: &dyn ProxmoxApi,
    args: &Value,
    kind: &str,
) -> Result<ToolOutput, ToolError> {
    let args: VmArgs = parse_args(args)?;
    let ticket = api
        .post(&format!("{}/{}", args.base()?, kind), Params::new())
        .await
        .map_err(|e| not_found_or(e, &args, "open console of"))?;
    Ok(ToolOutput::json(ticket))
}

#[derive(Deserialize)]
struct MoveDiskArgs {
    #[serde(flatten)]
    vm: VmArgs,
    disk: String,
    storage: String,
    delete: Option<bool>,
}

async fn move_disk(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: MoveDiskArgs = parse_args(args)?;
    let mut params = Params::new();
    params.insert("disk".to_string(), json!(args.disk.trim()));
    params.insert("storage".to_string(), json!(args.storage.trim()));
    if let Some(delete) = args.delete {
        params.insert("delete".to_string(), json!(delete));
    }

    let upid = api
        .post(&format!("{}/move_disk", args.vm.base()?), params)
        .await
        .map_err(|e| not_found_or(e, &args.vm, "move disk of"))?;
    Ok(ToolOutput::task(upid))
}

#[derive(Deserialize)]
struct ImportDiskArgs {
    #[serde(flatten)]
    vm: VmArgs,
    source: String,
    storage: String,
    disk: Option<String>,
}

async fn import_disk(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: ImportDiskArgs = parse_args(args)?;
    let slot = args.disk.as_deref().unwrap_or("scsi1").trim().to_string();

    let mut params = Params::new();
    params.insert(
        slot,
        json!(format!("{}:0,import-from={}", args.storage.trim(), args.source.trim())),
    );

    let upid = api
        .post(&format!("{}/config", args.vm.base()?), params)
        .await
        .map_err(|e| not_found_or(e, &args.vm, "import disk into"))?;
    Ok(ToolOutput::task(upid))
}

#[derive(Deserialize)]
struct AttachArgs {
    #[serde(flatten)]
    vm: VmArgs,
    disk: String,
    opts: DriveSpec,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DriveSpec {
    Spec(String),
    Options(Params),
}

impl DriveSpec {
    /// Render as a Proxmox drive string; a `file`/`volume` key leads unkeyed
    fn render(&self) -> String {
        match self {
            DriveSpec::Spec(spec) => spec.trim().to_string(),
            DriveSpec::Options(options) => {
                let mut parts = Vec::new();
                for key in ["file", "volume"] {
                    if let Some(value) = text(options.get(key)) {
                        parts.push(value);
                    }
                }
                for (key, value) in options {
                    if key == "file" || key == "volume" {
                        continue;
                    }
                    let value = match value {
                        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
                        other => text(Some(other)).unwrap_or_else(|| other.to_string()),
                    };
                    parts.push(format!("{}={}", key, value));
                }
                parts.join(",")
            }
        }
    }
}

async fn attach_disk(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: AttachArgs = parse_args(args)?;
    let spec = args.opts.render();
    if spec.is_empty() {
        return Err(ToolError::InvalidArguments("opts must describe a drive".to_string()));
    }

    let mut params = Params::new();
    params.insert(segment("disk", &args.disk)?.to_string(), json!(spec));

    let upid = api
        .post(&format!("{}/config", args.vm.base()?), params)
        .await
        .map_err(|e| not_found_or(e, &args.vm, "attach disk to"))?;
    Ok(ToolOutput::task(upid))
}

#[derive(Deserialize)]
struct DetachArgs {
    #[serde(flatten)]
    vm: VmArgs,
    disk: String,
}

async fn detach_disk(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: DetachArgs = parse_args(args)?;
    let mut params = Params::new();
    params.insert("delete".to_string(), json!(segment("disk", &args.disk)?));

    let upid = api
        .post(&format!("{}/config", args.vm.base()?), params)
        .await
        .map_err(|e| not_found_or(e, &args.vm, "detach disk from"))?;
    Ok(ToolOutput::task(upid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxmox::fake::FakeApi;
    use crate::proxmox::ApiMethod;

    async fn run(api: &FakeApi, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        call(api, name, &args).await.unwrap()
    }

    fn missing() -> ProxmoxError {
        ProxmoxError::Api {
            status: 500,
            message: "Configuration file 'nodes/pve/qemu-server/100.conf' does not exist".to_string(),
        }
    }

    #[tokio::test]
    async fn test_start_running_vm_is_noop() {
        let api = FakeApi::new();
        api.on_get("nodes/pve/qemu/100/status/current", json!({"status": "running"}));

        let output = run(&api, "start_vm", json!({"node": "pve", "vmid": "100"})).await.unwrap();
        assert_eq!(output.text, "VM 100 is already running");
        assert!(api.writes().is_empty());
    }

    #[tokio::test]
    async fn test_start_stopped_vm() {
        let api = FakeApi::new();
        api.on_get("nodes/pve/qemu/100/status/current", json!({"status": "stopped"}));
        api.on_post("nodes/pve/qemu/100/status/start", json!("UPID:pve:1:2:3:qmstart:100:root@pam:"));

        let output = run(&api, "start_vm", json!({"node": "pve", "vmid": 100})).await.unwrap();
        assert!(output.text.contains("start initiated"));
        assert!(output.text.contains("UPID:pve:1:2:3:qmstart"));
        assert_eq!(api.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_and_shutdown_stopped_vm() {
        let api = FakeApi::new();
        api.on_get("nodes/pve/qemu/100/status/current", json!({"status": "stopped"}));

        for tool in ["stop_vm", "shutdown_vm"] {
            let output = run(&api, tool, json!({"node": "pve", "vmid": 100})).await.unwrap();
            assert_eq!(output.text, "VM 100 is already stopped");
        }
        assert!(api.writes().is_empty());
    }

    #[tokio::test]
    async fn test_reset_stopped_vm() {
        let api = FakeApi::new();
        api.on_get("nodes/pve/qemu/100/status/current", json!({"status": "stopped"}));

        let output = run(&api, "reset_vm", json!({"node": "pve", "vmid": 100})).await.unwrap();
        assert!(output.text.starts_with("Cannot reset VM 100"));
        assert!(api.writes().is_empty());
    }

    #[tokio::test]
    async fn test_power_on_missing_vm() {
        let api = FakeApi::new();
        api.fail(ApiMethod::Get, "nodes/pve/qemu/100/status/current", missing());

        let err = run(&api, "shutdown_vm", json!({"node": "pve", "vmid": 100})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
        assert_eq!(err.to_string(), "VM 100 not found on node pve");
    }

    #[tokio::test]
    async fn test_delete_running_vm_requires_force() {
        let api = FakeApi::new();
        api.on_get(
            "nodes/pve/qemu/100/status/current",
            json!({"status": "running", "name": "web"}),
        );

        let err = run(&api, "delete_vm", json!({"node": "pve", "vmid": 100})).await.unwrap_err();
        assert!(matches!(err, ToolError::Precondition(_)));
        assert!(err.to_string().contains("force=true"));
        assert!(api.writes().is_empty());
    }

    #[tokio::test]
    async fn test_force_delete_stops_first() {
        let api = FakeApi::new();
        let stop_upid = "UPID:pve:00001:00002:00003:qmstop:100:root@pam:";
        api.on_get(
            "nodes/pve/qemu/100/status/current",
            json!({"status": "running", "name": "web"}),
        );
        api.on_post("nodes/pve/qemu/100/status/stop", json!(stop_upid));
        api.on_get(
            &format!("nodes/pve/tasks/{}/status", stop_upid),
            json!({"status": "stopped", "exitstatus": "OK"}),
        );
        api.on_delete("nodes/pve/qemu/100", json!("UPID:pve:destroy"));

        let output = run(&api, "delete_vm", json!({"node": "pve", "vmid": 100, "force": true}))
            .await
            .unwrap();

        let writes = api.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].path, "nodes/pve/qemu/100/status/stop");
        assert_eq!(writes[1].method, ApiMethod::Delete);
        assert!(output.text.contains("UPID:pve:destroy"));
    }

    #[tokio::test]
    async fn test_delete_stopped_vm() {
        let api = FakeApi::new();
        api.on_get("nodes/pve/qemu/101/status/current", json!({"status": "stopped"}));
        api.on_delete("nodes/pve/qemu/101", json!("UPID:pve:destroy"));

        let output = run(&api, "delete_vm", json!({"node": "pve", "vmid": 101})).await.unwrap();
        assert!(output.text.contains("VM 101 (VM-101) deletion initiated"));
    }

    fn storages() -> Value {
        json!([
            {"storage": "local", "type": "dir", "content": "iso,vztmpl,backup"},
            {"storage": "nas", "type": "nfs", "content": "images,iso"},
            {"storage": "local-lvm", "type": "lvmthin", "content": "images,rootdir"}
        ])
    }

    #[tokio::test]
    async fn test_create_vm_prefers_local_lvm() {
        let api = FakeApi::new();
        api.fail(ApiMethod::Get, "nodes/pve/qemu/200/config", missing());
        api.on_get("nodes/pve/storage", storages());
        api.on_post("nodes/pve/qemu", json!("UPID:pve:create"));

        let output = run(
            &api,
            "create_vm",
            json!({"node": "pve", "vmid": "200", "name": "web", "cpus": 2, "memory": 2048, "disk_size": 20}),
        )
        .await
        .unwrap();

        let create = &api.calls_to(ApiMethod::Post, "nodes/pve/qemu")[0];
        assert_eq!(create.params["scsi0"], "local-lvm:20,format=raw");
        assert!(create.params.get("ide2").is_none());
        assert_eq!(create.params["ostype"], "l26");
        assert_eq!(create.params["boot"], "order=scsi0");
        assert_eq!(create.params["net0"], "virtio,bridge=vmbr0");
        assert_eq!(create.params["agent"], "1");
        assert!(output.text.contains("no cloud-init drive"));
    }

    #[tokio::test]
    async fn test_create_vm_on_file_storage_adds_cloudinit() {
        let api = FakeApi::new();
        api.fail(ApiMethod::Get, "nodes/pve/qemu/201/config", missing());
        api.on_get("nodes/pve/storage", storages());
        api.on_post("nodes/pve/qemu", json!("UPID:pve:create"));

        run(
            &api,
            "create_vm",
            json!({"node": "pve", "vmid": 201, "name": "db", "cpus": 4, "memory": 4096,
                   "disk_size": 50, "storage": "nas", "ostype": "win11"}),
        )
        .await
        .unwrap();

        let create = &api.calls_to(ApiMethod::Post, "nodes/pve/qemu")[0];
        assert_eq!(create.params["scsi0"], "nas:50,format=qcow2");
        assert_eq!(create.params["ide2"], "nas:cloudinit");
        assert_eq!(create.params["ostype"], "win11");
    }

    #[tokio::test]
    async fn test_create_vm_rejects_existing_and_bad_ranges() {
        let api = FakeApi::new();
        api.on_get("nodes/pve/qemu/100/config", json!({"name": "taken"}));

        let base = json!({"node": "pve", "vmid": 100, "name": "x", "cpus": 1, "memory": 1024, "disk_size": 10});
        let err = run(&api, "create_vm", base.clone()).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let mut too_small = base;
        too_small["memory"] = json!(256);
        let err = run(&api, "create_vm", too_small).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(api.writes().is_empty());
    }

    #[tokio::test]
    async fn test_create_vm_rejects_storage_without_images() {
        let api = FakeApi::new();
        api.fail(ApiMethod::Get, "nodes/pve/qemu/300/config", missing());
        api.on_get("nodes/pve/storage", storages());

        let err = run(
            &api,
            "create_vm",
            json!({"node": "pve", "vmid": 300, "name": "x", "cpus": 1, "memory": 1024,
                   "disk_size": 10, "storage": "local"}),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("does not support VM images"));
    }

    #[test]
    fn test_pick_storage_fallbacks() {
        let only_nfs = json!([{"storage": "nas", "type": "nfs", "content": "images"}]);
        let chosen = pick_storage(only_nfs.as_array().unwrap(), None).unwrap();
        assert_eq!(chosen["storage"], "nas");

        let none = json!([{"storage": "local", "type": "dir", "content": "iso"}]);
        assert!(pick_storage(none.as_array().unwrap(), None).is_err());

        let vm_storage = json!([
            {"storage": "nas", "type": "nfs", "content": "images"},
            {"storage": "vm-storage", "type": "zfspool", "content": "images"}
        ]);
        let chosen = pick_storage(vm_storage.as_array().unwrap(), None).unwrap();
        assert_eq!(chosen["storage"], "vm-storage");
    }

    #[test]
    fn test_disk_layout() {
        assert_eq!(disk_layout("zfs", "zfspool", 8).0, "raw");
        let (format, drives) = disk_layout("local", "dir", 8);
        assert_eq!(format, "qcow2");
        assert_eq!(drives.len(), 2);
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("uname -a"), vec!["uname", "-a"]);
        assert_eq!(
            split_command(r#"sh -c 'echo "hi there" | wc -c'"#),
            vec!["sh", "-c", r#"echo "hi there" | wc -c"#]
        );
        assert_eq!(split_command(r#"echo "" x"#), vec!["echo", "", "x"]);
        assert!(split_command("   ").is_empty());
    }

    #[tokio::test]
    async fn test_execute_command_polls_status() {
        let api = FakeApi::new();
        api.on_get("nodes/pve/qemu/100/status/current", json!({"status": "running"}));
        api.on_post("nodes/pve/qemu/100/agent/exec", json!({"pid": 4242}));
        api.on_get(
            "nodes/pve/qemu/100/agent/exec-status",
            json!({"exited": 1, "exitcode": 0, "out-data": "Linux\n"}),
        );

        let output = run(
            &api,
            "execute_vm_command",
            json!({"node": "pve", "vmid": 100, "command": "uname -s"}),
        )
        .await
        .unwrap();

        let data = output.data.unwrap();
        assert_eq!(data["success"], true);
        assert_eq!(data["output"], "Linux\n");
        assert_eq!(data["exit_code"], 0);

        let exec = &api.calls_to(ApiMethod::Post, "nodes/pve/qemu/100/agent/exec")[0];
        assert_eq!(exec.params["command"], json!(["uname", "-s"]));
        let poll = &api.calls_to(ApiMethod::Get, "nodes/pve/qemu/100/agent/exec-status")[0];
        assert_eq!(poll.params["pid"], 4242);
    }

    #[tokio::test]
    async fn test_execute_command_requires_running_vm() {
        let api = FakeApi::new();
        api.on_get("nodes/pve/qemu/100/status/current", json!({"status": "stopped"}));

        let err = run(
            &api,
            "execute_vm_command",
            json!({"node": "pve", "vmid": 100, "command": "true"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_get_vms_with_config() {
        let api = FakeApi::new();
        api.on_get(
            "nodes",
            json!([{"node": "pve", "status": "online"}, {"node": "pve2", "status": "offline"}]),
        );
        api.on_get(
            "nodes/pve/qemu",
            json!([{"vmid": 100, "name": "web", "status": "running", "cpus": 2, "mem": 1, "maxmem": 2}]),
        );
        api.on_get("nodes/pve/qemu/100/config", json!({"cores": 2, "sockets": 2}));

        let output = run(&api, "get_vms", json!({"include_config": true})).await.unwrap();
        let vms = output.data.unwrap();
        assert_eq!(vms.as_array().unwrap().len(), 1);
        assert_eq!(vms[0]["cpus"], 4);
        assert_eq!(vms[0]["node"], "pve");
        assert!(api.calls_to(ApiMethod::Get, "nodes/pve2/qemu").is_empty());
    }

    #[tokio::test]
    async fn test_attach_and_detach_disk() {
        let api = FakeApi::new();
        run(
            &api,
            "vm_attach_disk",
            json!({"node": "pve", "vmid": 100, "disk": "scsi1",
                   "opts": {"file": "local-lvm:10", "ssd": true}}),
        )
        .await
        .unwrap();
        run(&api, "vm_detach_disk", json!({"node": "pve", "vmid": 100, "disk": "scsi1"}))
            .await
            .unwrap();

        let writes = api.writes();
        assert_eq!(writes[0].params["scsi1"], "local-lvm:10,ssd=1");
        assert_eq!(writes[1].params["delete"], "scsi1");
    }

    #[tokio::test]
    async fn test_snapshot_and_resize_paths() {
        let api = FakeApi::new();
        run(
            &api,
            "create_vm_snapshot",
            json!({"node": "pve", "vmid": 100, "snapname": "pre-upgrade", "vmstate": true}),
        )
        .await
        .unwrap();
        run(&api, "resize_vm_disk", json!({"node": "pve", "vmid": 100, "disk": "scsi0", "size": "+10G"}))
            .await
            .unwrap();

        let writes = api.writes();
        assert_eq!(writes[0].path, "nodes/pve/qemu/100/snapshot");
        assert_eq!(writes[0].params["vmstate"], true);
        assert_eq!(writes[1].method, ApiMethod::Put);
        assert_eq!(writes[1].path, "nodes/pve/qemu/100/resize");
    }
}
