//! Planner against a scripted cluster
//!
//! Tests the full flow: YAML file -> cluster state -> diff -> rendered plan

use proxmox_mcp::plan::{plan_file, render, PlanError};
use proxmox_mcp::proxmox::fake::FakeApi;
use proxmox_mcp::proxmox::ApiMethod;
use serde_json::{json, Value};
use tempfile::tempdir;

const SPEC: &str = r#"
prune: "lab-*"
vms:
  - name: web-1
    node: pve
    vmid: 100
    cpus: 2
    memory: 4096
    disk_gb: 40
  - name: db-1
    node: pve
    cores: 4
    memory: 8192
  - name: cache-1
    node: pve2
    cpu: 1
    memory: 1024
    disk: 10
    storage: local-lvm
"#;

fn cluster() -> FakeApi {
    let api = FakeApi::new();
    api.on_get(
        "cluster/resources",
        json!([
            {"type": "qemu", "vmid": 100, "node": "pve", "name": "web-1", "status": "running"},
            {"type": "qemu", "vmid": 101, "node": "pve", "name": "db-1", "status": "running"},
            {"type": "qemu", "vmid": 130, "node": "pve", "name": "lab-scratch", "status": "stopped"},
            {"type": "qemu", "vmid": 131, "node": "pve", "name": "prod-api", "status": "running"},
            {"type": "qemu", "vmid": 9000, "node": "pve", "name": "lab-template", "template": 1},
            {"type": "lxc", "vmid": 200, "node": "pve", "name": "lab-ct"},
        ]),
    );
    api.on_get(
        "nodes/pve/qemu/100/config",
        json!({"name": "web-1", "cores": 2, "memory": "2048", "boot": "order=scsi0;net0",
               "scsi0": "local-lvm:vm-100-disk-0,size=32G"}),
    );
    api.on_get(
        "nodes/pve/qemu/101/config",
        json!({"name": "db-1", "cores": 2, "sockets": 2, "memory": 8192}),
    );
    api.on_get("nodes/pve/qemu/130/config", json!({"name": "lab-scratch"}));
    api.on_get("nodes/pve/qemu/131/config", json!({"name": "prod-api"}));
    api
}

#[tokio::test]
async fn test_plan_file_end_to_end() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("infra.yaml");
    tokio::fs::write(&path, SPEC).await.unwrap();

    let api = cluster();
    let plan = plan_file(&api, &path).await.unwrap();

    assert_eq!(plan.creates.len(), 1);
    assert_eq!(plan.creates[0].name, "cache-1");

    assert_eq!(plan.changes.len(), 1);
    assert_eq!(plan.changes[0].vm.vmid, 100);
    let fields: Vec<&str> = plan.changes[0].fields.iter().map(|f| f.field).collect();
    assert_eq!(fields, vec!["memory", "disk_gb"]);

    assert_eq!(plan.unchanged, vec!["db-1"]);

    assert_eq!(plan.deletes.len(), 1);
    assert_eq!(plan.deletes[0].vmid, 130);

    let text = render(&plan, false).unwrap();
    assert!(text.contains("+ cache-1"));
    assert!(text.contains("~ web-1 (vmid 100 on pve)"));
    assert!(text.contains("    memory: 2048 MiB -> 4096 MiB"));
    assert!(text.contains("    disk: 32 GiB -> 40 GiB"));
    assert!(text.contains("- lab-scratch (vmid 130 on pve)"));
    assert!(text.contains("Plan: 1 to create, 1 to change, 1 to delete."));

    let json: Value = serde_json::from_str(&render(&plan, true).unwrap()).unwrap();
    assert_eq!(json["summary"], json!({"create": 1, "change": 1, "delete": 1}));

    // Planning never writes.
    assert!(api.writes().is_empty());
    assert!(api
        .calls_to(ApiMethod::Get, "nodes/pve/qemu/9000/config")
        .is_empty());
}

#[tokio::test]
async fn test_invalid_spec_never_touches_cluster() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("infra.yaml");
    tokio::fs::write(&path, "vms:\n  - {name: a, node: pve, vmid: 5}\n")
        .await
        .unwrap();

    let api = cluster();
    let err = plan_file(&api, &path).await.unwrap_err();
    assert!(matches!(err, PlanError::Invalid(_)));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_cluster_failure_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("infra.yaml");
    tokio::fs::write(&path, "vms: []\n").await.unwrap();

    let api = FakeApi::new();
    let err = plan_file(&api, &path).await.unwrap_err();
    assert!(matches!(err, PlanError::Proxmox(_)));
}
