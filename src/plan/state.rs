//! Actual VM state read from the cluster

use crate::proxmox::{Params, ProxmoxApi, ProxmoxError};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Disk keys Proxmox accepts in `boot: order=...`, in fallback order
const DISK_BUSES: [&str; 4] = ["scsi", "virtio", "sata", "ide"];

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A QEMU VM as it currently exists
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActualVm {
    pub vmid: u32,
    pub name: String,
    pub node: String,
    pub status: String,
    /// cores x sockets
    pub cpus: Option<u32>,
    /// MiB
    pub memory: Option<u64>,
    /// Boot disk size in GiB, rounded up
    pub disk_gb: Option<u64>,
    pub ostype: Option<String>,
}

/// Read every non-template QEMU VM and its configuration
pub async fn fetch_actual(api: &dyn ProxmoxApi) -> Result<Vec<ActualVm>, ProxmoxError> {
    let mut params = Params::new();
    params.insert("type".to_string(), Value::from("vm"));
    let resources = api.get_with("cluster/resources", params).await?;

    let mut vms = Vec::new();
    for resource in resources.as_array().into_iter().flatten() {
        if resource.get("type").and_then(Value::as_str) != Some("qemu") {
            continue;
        }
        if resource.get("template").and_then(as_u64) == Some(1) {
            continue;
        }
        let (Some(vmid), Some(node)) = (
            resource.get("vmid").and_then(as_u64).and_then(|v| u32::try_from(v).ok()),
            resource.get("node").and_then(Value::as_str),
        ) else {
            warn!(resource = %resource, "Skipping VM resource without vmid or node");
            continue;
        };

        let config = api
            .get(&format!("nodes/{}/qemu/{}/config", node, vmid))
            .await?;
        debug!(vmid, node, "Read VM config");

        vms.push(ActualVm::from_parts(vmid, node, resource, &config));
    }

    vms.sort_by_key(|vm| vm.vmid);
    Ok(vms)
}

impl ActualVm {
    fn from_parts(vmid: u32, node: &str, resource: &Value, config: &Value) -> Self {
        let name = config
            .get("name")
            .or_else(|| resource.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("VM {}", vmid));

        let cores = config.get("cores").and_then(as_u64).unwrap_or(1);
        let sockets = config.get("sockets").and_then(as_u64).unwrap_or(1);
        let cpus = u32::try_from(cores * sockets).ok();

        let memory = config
            .get("memory")
            .and_then(as_u64)
            .or_else(|| {
                resource
                    .get("maxmem")
                    .and_then(as_u64)
                    .map(|bytes| bytes / (1024 * 1024))
            });

        Self {
            vmid,
            name,
            node: node.to_string(),
            status: resource
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            cpus,
            memory,
            disk_gb: boot_disk(config).and_then(parse_disk_size),
            ostype: config
                .get("ostype")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// Integer that Proxmox may send as a number or a numeric string
fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_disk_key(key: &str) -> bool {
    DISK_BUSES.iter().any(|bus| {
        key.strip_prefix(bus)
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
    })
}

fn is_cdrom(spec: &str) -> bool {
    spec.split(',').any(|part| part == "media=cdrom")
}

/// Drive spec of the boot disk
///
/// Tries `boot: order=...`, then the legacy `bootdisk` key, then the first
/// non-CD-ROM disk on the usual buses.
pub fn boot_disk(config: &Value) -> Option<&str> {
    if let Some(order) = config
        .get("boot")
        .and_then(Value::as_str)
        .and_then(|boot| boot.split(',').find_map(|part| part.strip_prefix("order=")))
    {
        if let Some(spec) = order
            .split(';')
            .filter(|k| is_disk_key(k))
            .find_map(|key| drive(config, key))
        {
            return Some(spec);
        }
    }

    if let Some(spec) = config
        .get("bootdisk")
        .and_then(Value::as_str)
        .and_then(|key| drive(config, key))
    {
        return Some(spec);
    }

    DISK_BUSES
        .iter()
        .flat_map(|bus| (0..4).map(move |n| format!("{}{}", bus, n)))
        .find_map(|key| drive(config, &key))
}

fn drive<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .filter(|spec| !is_cdrom(spec))
}

/// GiB from the `size=` option of a drive spec, rounded up
///
/// Units K, M, G, T are binary; a bare number is bytes.
pub fn parse_disk_size(spec: &str) -> Option<u64> {
    let size = spec
        .split(',')
        .find_map(|part| part.trim().strip_prefix("size="))?;

    let (number, multiplier) = match size.chars().last()? {
        'K' | 'k' => (&size[..size.len() - 1], 1024.0),
        'M' | 'm' => (&size[..size.len() - 1], 1024.0 * 1024.0),
        'G' | 'g' => (&size[..size.len() - 1], GIB),
        'T' | 't' => (&size[..size.len() - 1], GIB * 1024.0),
        _ => (size, 1.0),
    };

    let value: f64 = number.trim().parse().ok()?;
    if value < 0.0 {
        return None;
    }
    Some((value * multiplier / GIB).ceil() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxmox::fake::FakeApi;
    use serde_json::json;

    #[test]
    fn test_parse_disk_size() {
        assert_eq!(parse_disk_size("local-lvm:vm-100-disk-0,size=32G"), Some(32));
        assert_eq!(parse_disk_size("local:100/vm-100-disk-0.qcow2,format=qcow2,size=1T"), Some(1024));
        assert_eq!(parse_disk_size("ceph:vm-100-disk-1,size=512M"), Some(1));
        assert_eq!(parse_disk_size("ceph:vm-100-disk-1,size=2.5G"), Some(3));
        assert_eq!(parse_disk_size("ceph:vm-100-disk-1,size=10737418240"), Some(10));
        assert_eq!(parse_disk_size("none,media=cdrom"), None);
        assert_eq!(parse_disk_size("x,size=abcG"), None);
    }

    #[test]
    fn test_boot_disk_detection() {
        let config = json!({
            "boot": "order=ide2;virtio0;net0",
            "ide2": "local:iso/debian.iso,media=cdrom,size=600M",
            "scsi0": "local-lvm:vm-100-disk-1,size=8G",
            "virtio0": "local-lvm:vm-100-disk-0,size=40G",
        });
        assert_eq!(boot_disk(&config), Some("local-lvm:vm-100-disk-0,size=40G"));

        let legacy = json!({"bootdisk": "sata0", "sata0": "local:vm-1-disk-0,size=16G"});
        assert_eq!(boot_disk(&legacy), Some("local:vm-1-disk-0,size=16G"));

        let fallback = json!({
            "ide0": "none,media=cdrom",
            "scsi1": "local-lvm:vm-100-disk-2,size=100G",
        });
        assert_eq!(boot_disk(&fallback), Some("local-lvm:vm-100-disk-2,size=100G"));

        assert_eq!(boot_disk(&json!({"net0": "virtio=AA:BB"})), None);
    }

    #[tokio::test]
    async fn test_fetch_actual_skips_templates_and_containers() {
        let api = FakeApi::new();
        api.on_get(
            "cluster/resources",
            json!([
                {"type": "qemu", "vmid": 101, "node": "pve", "name": "db-1", "status": "running"},
                {"type": "qemu", "vmid": 100, "node": "pve", "name": "web-1", "status": "stopped"},
                {"type": "qemu", "vmid": 9000, "node": "pve", "name": "tpl", "template": 1},
                {"type": "lxc", "vmid": 200, "node": "pve", "name": "ct"},
            ]),
        );
        api.on_get(
            "nodes/pve/qemu/100/config",
            json!({"name": "web-1", "cores": 2, "sockets": 2, "memory": "2048",
                   "ostype": "l26", "scsi0": "local-lvm:vm-100-disk-0,size=20G"}),
        );
        api.on_get("nodes/pve/qemu/101/config", json!({"name": "db-1", "memory": 4096}));

        let vms = fetch_actual(&api).await.unwrap();
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].vmid, 100);
        assert_eq!(vms[0].cpus, Some(4));
        assert_eq!(vms[0].memory, Some(2048));
        assert_eq!(vms[0].disk_gb, Some(20));
        assert_eq!(vms[0].ostype.as_deref(), Some("l26"));
        assert_eq!(vms[1].cpus, Some(1));
        assert_eq!(vms[1].disk_gb, None);
        assert_eq!(vms[1].status, "running");

        let resources = api.calls_to(crate::proxmox::ApiMethod::Get, "cluster/resources");
        assert_eq!(resources[0].params["type"], "vm");
        assert!(api
            .calls_to(crate::proxmox::ApiMethod::Get, "nodes/pve/qemu/9000/config")
            .is_empty());
    }
}
