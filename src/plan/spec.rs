//! Desired infrastructure as read from YAML

use super::PlanError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const MIN_VMID: u32 = 100;
const MAX_CPUS: u32 = 128;
const MIN_MEMORY_MIB: u64 = 16;

/// Top-level infrastructure document
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InfraSpec {
    /// Glob on VM names; unmatched VMs it covers are planned for deletion
    #[serde(default)]
    pub prune: Option<String>,
    #[serde(default)]
    pub vms: Vec<DesiredVm>,
}

/// One VM the cluster should have
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredVm {
    pub name: String,
    pub node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmid: Option<u32>,
    /// Total vCPUs (cores x sockets)
    #[serde(default, alias = "cpu", alias = "cores", skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
    /// MiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    /// Boot disk size in GiB
    #[serde(default, alias = "disk", alias = "disk_size", skip_serializing_if = "Option::is_none")]
    pub disk_gb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ostype: Option<String>,
}

impl InfraSpec {
    /// Read, parse and validate a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PlanError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&content)
    }

    /// Parse and validate a YAML document
    pub fn parse(content: &str) -> Result<Self, PlanError> {
        let spec: InfraSpec =
            serde_yaml::from_str(content).map_err(|e| PlanError::Parse(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if let Some(prune) = &self.prune {
            glob::Pattern::new(prune)
                .map_err(|e| PlanError::Invalid(format!("prune: invalid glob '{}': {}", prune, e)))?;
        }

        let mut names = HashSet::new();
        let mut vmids = HashSet::new();

        for (index, vm) in self.vms.iter().enumerate() {
            let label = if vm.name.trim().is_empty() {
                format!("vms[{}]", index)
            } else {
                vm.name.clone()
            };
            let invalid = |message: String| PlanError::Invalid(format!("{}: {}", label, message));

            if vm.name.trim().is_empty() {
                return Err(invalid("name must not be empty".to_string()));
            }
            if vm.node.trim().is_empty() {
                return Err(invalid("node must not be empty".to_string()));
            }
            if !names.insert(vm.name.as_str()) {
                return Err(invalid("duplicate VM name".to_string()));
            }

            if let Some(vmid) = vm.vmid {
                if vmid < MIN_VMID {
                    return Err(invalid(format!("vmid must be at least {}, got {}", MIN_VMID, vmid)));
                }
                if !vmids.insert(vmid) {
                    return Err(invalid(format!("duplicate vmid {}", vmid)));
                }
            }
            if let Some(cpus) = vm.cpus {
                if !(1..=MAX_CPUS).contains(&cpus) {
                    return Err(invalid(format!("cpus must be between 1 and {}, got {}", MAX_CPUS, cpus)));
                }
            }
            if let Some(memory) = vm.memory {
                if memory < MIN_MEMORY_MIB {
                    return Err(invalid(format!(
                        "memory must be at least {} MiB, got {}",
                        MIN_MEMORY_MIB, memory
                    )));
                }
            }
            if vm.disk_gb == Some(0) {
                return Err(invalid("disk_gb must be at least 1".to_string()));
            }
        }

        Ok(())
    }

    /// Compiled prune pattern, if any
    pub fn prune_pattern(&self) -> Result<Option<glob::Pattern>, PlanError> {
        self.prune
            .as_deref()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| PlanError::Invalid(format!("prune: invalid glob '{}': {}", p, e)))
            })
            .transpose()
    }
}
