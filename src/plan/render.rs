//! Plan output

use super::diff::{FieldChange, Plan};
use super::spec::DesiredVm;
use super::PlanError;
use serde_json::Value;
use std::fmt::Write;

/// Human-readable plan with `+`, `~` and `-` lines
pub fn render_text(plan: &Plan) -> String {
    let mut out = String::new();

    for vm in &plan.creates {
        let _ = writeln!(out, "+ {}", describe_create(vm));
    }

    for change in &plan.changes {
        let _ = writeln!(
            out,
            "~ {} (vmid {} on {})",
            change.vm.name, change.vm.vmid, change.vm.node
        );
        for field in &change.fields {
            let _ = writeln!(out, "    {}", describe_field(field));
        }
    }

    for vm in &plan.deletes {
        let _ = writeln!(out, "- {} (vmid {} on {})", vm.name, vm.vmid, vm.node);
    }

    if plan.is_empty() {
        out.push_str("No changes. Infrastructure matches the spec.\n");
    }

    if !plan.warnings.is_empty() {
        out.push_str("\nWarnings:\n");
        for warning in &plan.warnings {
            let _ = writeln!(out, "  ! {}", warning);
        }
    }

    let _ = writeln!(
        out,
        "\nPlan: {} to create, {} to change, {} to delete.",
        plan.summary.create, plan.summary.change, plan.summary.delete
    );
    out
}

/// The plan as indented JSON
pub fn render_json(plan: &Plan) -> Result<String, PlanError> {
    serde_json::to_string_pretty(plan).map_err(|e| PlanError::Render(e.to_string()))
}

fn describe_create(vm: &DesiredVm) -> String {
    let mut parts = vec![
        format!("node {}", vm.node),
        match vm.vmid {
            Some(vmid) => format!("vmid {}", vmid),
            None => "vmid auto".to_string(),
        },
    ];
    if let Some(cpus) = vm.cpus {
        parts.push(format!("{} cpu{}", cpus, if cpus == 1 { "" } else { "s" }));
    }
    if let Some(memory) = vm.memory {
        parts.push(format!("{} MiB", memory));
    }
    if let Some(disk) = vm.disk_gb {
        match &vm.storage {
            Some(storage) => parts.push(format!("{} GiB on {}", disk, storage)),
            None => parts.push(format!("{} GiB", disk)),
        }
    }
    if let Some(ostype) = &vm.ostype {
        parts.push(format!("ostype {}", ostype));
    }

    format!("{} ({})", vm.name, parts.join(", "))
}

fn describe_field(change: &FieldChange) -> String {
    let show = |value: &Value| match value {
        Value::Null => "(unknown)".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let unit = match change.field {
        "memory" => " MiB",
        "disk_gb" => " GiB",
        _ => "",
    };
    let field = if change.field == "disk_gb" { "disk" } else { change.field };

    format!(
        "{}: {}{} -> {}{}",
        field,
        show(&change.from),
        if change.from.is_null() { "" } else { unit },
        show(&change.to),
        unit
    )
}

#[cfg(test)]
mod tests {
    use super::super::diff::diff;
    use super::super::spec::InfraSpec;
    use super::super::state::ActualVm;
    use super::*;

    fn sample() -> Plan {
        let spec = InfraSpec::parse(
            r#"
prune: "lab-*"
vms:
  - {name: web-1, node: pve, cpus: 2, memory: 2048, disk_gb: 20, storage: local-lvm}
  - {name: db-1, node: pve, memory: 8192}
"#,
        )
        .unwrap();
        let actual = vec![
            ActualVm {
                vmid: 101,
                name: "db-1".into(),
                node: "pve".into(),
                status: "running".into(),
                cpus: Some(4),
                memory: Some(4096),
                disk_gb: Some(50),
                ostype: None,
            },
            ActualVm {
                vmid: 130,
                name: "lab-old".into(),
                node: "pve".into(),
                status: "stopped".into(),
                cpus: Some(1),
                memory: Some(512),
                disk_gb: None,
                ostype: None,
            },
        ];
        diff(&spec, &actual).unwrap()
    }

    #[test]
    fn test_render_text() {
        let text = render_text(&sample());

        assert!(text.contains("+ web-1 (node pve, vmid auto, 2 cpus, 2048 MiB, 20 GiB on local-lvm)"));
        assert!(text.contains("~ db-1 (vmid 101 on pve)\n    memory: 4096 MiB -> 8192 MiB"));
        assert!(text.contains("- lab-old (vmid 130 on pve)"));
        assert!(text.trim_end().ends_with("Plan: 1 to create, 1 to change, 1 to delete."));
    }

    #[test]
    fn test_render_empty_plan() {
        let plan = diff(&InfraSpec::default(), &[]).unwrap();
        let text = render_text(&plan);
        assert!(text.starts_with("No changes."));
        assert!(text.contains("Plan: 0 to create, 0 to change, 0 to delete."));
    }

    #[test]
    fn test_render_json() {
        let json: Value = serde_json::from_str(&render_json(&sample()).unwrap()).unwrap();
        assert_eq!(json["summary"]["create"], 1);
        assert_eq!(json["changes"][0]["vmid"], 101);
        assert_eq!(json["changes"][0]["fields"][0]["field"], "memory");
        assert_eq!(json["deletes"][0]["name"], "lab-old");
        assert!(json["generated_at"].is_string());
    }

    #[test]
    fn test_describe_unknown_from() {
        let change = FieldChange {
            field: "cpus",
            from: Value::Null,
            to: 4.into(),
        };
        assert_eq!(describe_field(&change), "cpus: (unknown) -> 4");
    }
}
