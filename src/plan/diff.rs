//! Desired vs actual comparison

use super::spec::{DesiredVm, InfraSpec};
use super::state::ActualVm;
use super::PlanError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// Everything needed to reconcile the cluster with a spec
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub creates: Vec<DesiredVm>,
    pub changes: Vec<VmChange>,
    pub deletes: Vec<VmRef>,
    /// Names of matched VMs that need nothing
    pub unchanged: Vec<String>,
    pub warnings: Vec<String>,
    pub summary: Summary,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub create: usize,
    pub change: usize,
    pub delete: usize,
}

/// An existing VM
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmRef {
    pub vmid: u32,
    pub name: String,
    pub node: String,
}

impl From<&ActualVm> for VmRef {
    fn from(vm: &ActualVm) -> Self {
        Self {
            vmid: vm.vmid,
            name: vm.name.clone(),
            node: vm.node.clone(),
        }
    }
}

/// Field updates for one matched VM
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmChange {
    #[serde(flatten)]
    pub vm: VmRef,
    pub fields: Vec<FieldChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub from: Value,
    pub to: Value,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.changes.is_empty() && self.deletes.is_empty()
    }
}

/// Compare a validated spec against the VMs that exist
pub fn diff(spec: &InfraSpec, actual: &[ActualVm]) -> Result<Plan, PlanError> {
    let prune = spec.prune_pattern()?;

    let mut actual: Vec<&ActualVm> = actual.iter().collect();
    actual.sort_by_key(|vm| vm.vmid);

    let mut claimed: HashSet<u32> = HashSet::new();
    let mut warnings = Vec::new();
    let mut matches: Vec<Option<(&ActualVm, bool)>> = vec![None; spec.vms.len()];

    // Explicit vmids claim their VMs before any name lookup.
    for (index, desired) in spec.vms.iter().enumerate() {
        let Some(vmid) = desired.vmid else { continue };
        match actual.iter().find(|vm| vm.vmid == vmid) {
            Some(vm) => {
                claimed.insert(vm.vmid);
                matches[index] = Some((*vm, true));
            }
            None => {
                if let Some(other) = actual.iter().find(|vm| vm.name == desired.name) {
                    warnings.push(format!(
                        "{}: vmid {} does not exist but a VM with this name exists as {}; a new VM will be created",
                        desired.name, vmid, other.vmid
                    ));
                }
            }
        }
    }

    for (index, desired) in spec.vms.iter().enumerate() {
        if desired.vmid.is_some() {
            continue;
        }
        let candidates: Vec<&ActualVm> = actual
            .iter()
            .copied()
            .filter(|vm| vm.name == desired.name && !claimed.contains(&vm.vmid))
            .collect();

        if let Some(first) = candidates.first() {
            if candidates.len() > 1 {
                let ids: Vec<String> = candidates.iter().map(|vm| vm.vmid.to_string()).collect();
                warnings.push(format!(
                    "{}: {} VMs share this name ({}); using vmid {}",
                    desired.name,
                    candidates.len(),
                    ids.join(", "),
                    first.vmid
                ));
            }
            claimed.insert(first.vmid);
            matches[index] = Some((*first, false));
        }
    }

    let mut creates = Vec::new();
    let mut changes = Vec::new();
    let mut unchanged = Vec::new();

    for (desired, matched) in spec.vms.iter().zip(matches) {
        let Some((vm, by_vmid)) = matched else {
            creates.push(desired.clone());
            continue;
        };

        let fields = compare(desired, vm, by_vmid, &mut warnings);
        if fields.is_empty() {
            unchanged.push(desired.name.clone());
        } else {
            changes.push(VmChange {
                vm: VmRef::from(vm),
                fields,
            });
        }
    }

    let deletes: Vec<VmRef> = match &prune {
        Some(pattern) => actual
            .iter()
            .filter(|vm| !claimed.contains(&vm.vmid) && pattern.matches(&vm.name))
            .map(|vm| VmRef::from(*vm))
            .collect(),
        None => Vec::new(),
    };

    Ok(Plan {
        summary: Summary {
            create: creates.len(),
            change: changes.len(),
            delete: deletes.len(),
        },
        creates,
        changes,
        deletes,
        unchanged,
        warnings,
        generated_at: Utc::now(),
    })
}

fn compare(
    desired: &DesiredVm,
    actual: &ActualVm,
    by_vmid: bool,
    warnings: &mut Vec<String>,
) -> Vec<FieldChange> {
    let mut fields = Vec::new();
    let mut push = |field: &'static str, from: Value, to: Value| {
        if from != to {
            fields.push(FieldChange { field, from, to });
        }
    };

    if by_vmid {
        push("name", actual.name.clone().into(), desired.name.clone().into());
    }
    push("node", actual.node.clone().into(), desired.node.clone().into());
    if let Some(cpus) = desired.cpus {
        push("cpus", actual.cpus.into(), cpus.into());
    }
    if let Some(memory) = desired.memory {
        push("memory", actual.memory.into(), memory.into());
    }
    if let Some(ostype) = &desired.ostype {
        push("ostype", actual.ostype.clone().into(), ostype.clone().into());
    }

    if let Some(disk) = desired.disk_gb {
        match actual.disk_gb {
            Some(current) if disk > current => push("disk_gb", current.into(), disk.into()),
            Some(current) if disk < current => warnings.push(format!(
                "{}: disk is {} GiB, spec asks for {} GiB; disks cannot shrink, leaving as is",
                desired.name, current, disk
            )),
            Some(_) => {}
            None => warnings.push(format!(
                "{}: could not determine boot disk size of vmid {}",
                desired.name, actual.vmid
            )),
        }
    }

    fields
}
