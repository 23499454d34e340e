//! Infrastructure-as-code planner
//!
//! Reads a YAML description of desired QEMU VMs, fetches what the cluster
//! actually runs and reports the creates, changes and deletes needed to
//! reconcile the two. Planning only reads from the cluster.

mod diff;
mod render;
mod spec;
mod state;

pub use diff::{diff, FieldChange, Plan, Summary, VmChange, VmRef};
pub use render::{render_json, render_text};
pub use spec::{DesiredVm, InfraSpec};
pub use state::{boot_disk, fetch_actual, parse_disk_size, ActualVm};

use crate::proxmox::{ProxmoxApi, ProxmoxError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Planner errors
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Parse(String),

    #[error("Invalid infrastructure spec: {0}")]
    Invalid(String),

    #[error("Failed to read cluster state: {0}")]
    Proxmox(#[from] ProxmoxError),

    #[error("Failed to render plan: {0}")]
    Render(String),
}

/// Load a spec file and plan it against the cluster
pub async fn plan_file(api: &dyn ProxmoxApi, path: impl AsRef<Path>) -> Result<Plan, PlanError> {
    let spec = InfraSpec::load(path.as_ref()).await?;
    info!(path = %path.as_ref().display(), vms = spec.vms.len(), "Loaded infrastructure spec");

    let actual = fetch_actual(api).await?;
    let plan = diff(&spec, &actual)?;

    info!(
        create = plan.summary.create,
        change = plan.summary.change,
        delete = plan.summary.delete,
        "Plan computed"
    );
    Ok(plan)
}

/// Plan as text, or as JSON when `json` is set
pub fn render(plan: &Plan, json: bool) -> Result<String, PlanError> {
    if json {
        render_json(plan)
    } else {
        Ok(render_text(plan))
    }
}
